// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hardware configuration
//!
//! Settings that change how the core behaves but are not part of the
//! emulated machine state. Loaded from TOML, with `EEHW_*` environment
//! variables taking precedence.

use crate::core::error::{EmulatorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default main memory size (32 MiB)
pub const DEFAULT_MAIN_MEMORY_SIZE: usize = 32 * 1024 * 1024;

/// Hardware core configuration
///
/// # Example
///
/// ```
/// use eehw::core::config::HwConfig;
///
/// let config = HwConfig::default();
/// assert_eq!(config.main_memory_size, 32 * 1024 * 1024);
/// assert!(!config.inline_irqs);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwConfig {
    /// Size of guest main memory in bytes
    pub main_memory_size: usize,

    /// Deliver DMA completion interrupts as soon as a transfer finishes
    /// instead of after the scheduled delay
    pub inline_irqs: bool,

    /// Delay, in cycles, charged per transferred quadword before a
    /// completion interrupt is delivered
    pub irq_cycles_per_qword: u32,

    /// Drop byte/halfword writes to a busy channel's MADR/QWC/TADR
    pub narrow_write_busy_guard: bool,

    /// Maximum number of tags a chain-mode channel fetches in one step
    pub max_tags_per_step: u32,
}

impl Default for HwConfig {
    fn default() -> Self {
        Self {
            main_memory_size: DEFAULT_MAIN_MEMORY_SIZE,
            inline_irqs: false,
            irq_cycles_per_qword: 2,
            narrow_write_busy_guard: true,
            max_tags_per_step: 32,
        }
    }
}

impl HwConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check that the configuration describes a usable machine
    pub fn validate(&self) -> Result<()> {
        if self.main_memory_size < 1024 * 1024 || !self.main_memory_size.is_power_of_two() {
            return Err(EmulatorError::InvalidConfig(format!(
                "main_memory_size must be a power of two of at least 1 MiB, got {}",
                self.main_memory_size
            )));
        }
        if self.main_memory_size > 0x1000_0000 {
            return Err(EmulatorError::InvalidConfig(format!(
                "main_memory_size 0x{:X} overlaps the register space",
                self.main_memory_size
            )));
        }
        if self.max_tags_per_step == 0 {
            return Err(EmulatorError::InvalidConfig(
                "max_tags_per_step must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Override fields from `EEHW_*` environment variables
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
        if let Some(v) = parse_var(&get, "EEHW_MAIN_MEMORY_SIZE") {
            self.main_memory_size = v;
        }
        if let Some(v) = parse_var(&get, "EEHW_INLINE_IRQS") {
            self.inline_irqs = v;
        }
        if let Some(v) = parse_var(&get, "EEHW_IRQ_CYCLES_PER_QWORD") {
            self.irq_cycles_per_qword = v;
        }
        if let Some(v) = parse_var(&get, "EEHW_NARROW_WRITE_BUSY_GUARD") {
            self.narrow_write_busy_guard = v;
        }
        if let Some(v) = parse_var(&get, "EEHW_MAX_TAGS_PER_STEP") {
            self.max_tags_per_step = v;
        }
    }
}

fn parse_var<T, F>(get: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}: cannot parse '{}'", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let config = HwConfig::default();
        assert!(config.validate().is_ok(), "Default config must validate");
        assert_eq!(config.max_tags_per_step, 32);
        assert!(config.narrow_write_busy_guard);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eehw.toml");

        let config = HwConfig {
            inline_irqs: true,
            irq_cycles_per_qword: 8,
            ..HwConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = HwConfig::load(&path).unwrap();
        assert_eq!(loaded, config, "Loaded config should match saved config");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "inline_irqs = true\n").unwrap();

        let loaded = HwConfig::load(&path).unwrap();
        assert!(loaded.inline_irqs);
        assert_eq!(loaded.main_memory_size, DEFAULT_MAIN_MEMORY_SIZE);
    }

    #[test]
    fn test_load_rejects_bad_memory_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "main_memory_size = 3000000\n").unwrap();

        let result = HwConfig::load(&path);
        assert!(matches!(result, Err(EmulatorError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "inline_irqs = [").unwrap();

        assert!(matches!(
            HwConfig::load(&path),
            Err(EmulatorError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EEHW_INLINE_IRQS", "true"),
            ("EEHW_MAX_TAGS_PER_STEP", "4"),
            ("EEHW_IRQ_CYCLES_PER_QWORD", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = HwConfig::default();
        config.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.inline_irqs);
        assert_eq!(config.max_tags_per_step, 4);
        assert_eq!(
            config.irq_cycles_per_qword, 2,
            "Unparseable override should be ignored"
        );
    }
}
