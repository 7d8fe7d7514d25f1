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

//! EEHW trace entry point
//!
//! Replays a script of register accesses against the hardware core and
//! dumps the resulting state as JSON. Useful for reproducing DMA setups
//! captured from a guest with `RUST_LOG=eehw=trace`.
//!
//! Script format (TOML):
//!
//! ```toml
//! [[ops]]
//! op = "write"
//! address = 0x1000E000
//! value = 1
//!
//! [[ops]]
//! op = "run"
//! rounds = 64
//!
//! [[ops]]
//! op = "read"
//! address = 0x1000E010
//! ```

use clap::Parser;
use eehw::core::config::HwConfig;
use eehw::core::dma::ChannelId;
use eehw::core::hardware::Hardware;
use eehw::core::interrupt::interrupts;
use eehw::EmulatorError;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Replay EE register accesses and dump hardware state")]
struct Args {
    /// Register access script (TOML)
    script: PathBuf,

    /// Hardware config file (TOML); EEHW_* variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Raw memory image to load before the script runs
    #[arg(long)]
    image: Option<PathBuf>,

    /// Guest address the image is loaded at (hex: 0x1234 or decimal)
    #[arg(long, value_parser = parse_hex_or_dec, default_value = "0")]
    load_addr: u32,

    /// Cycles of emulated time per run round
    #[arg(long, default_value_t = 64)]
    cycles_per_round: u32,

    /// Stand-in decoder copies consumed input into the output FIFO
    #[arg(long)]
    loopback: bool,

    /// Include the raw register store in the dump
    #[arg(long)]
    registers: bool,

    /// Write the state here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    ops: Vec<Op>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Op {
    Write {
        address: u32,
        value: u64,
        #[serde(default = "default_width")]
        width: u32,
    },
    Read {
        address: u32,
        #[serde(default = "default_width")]
        width: u32,
    },
    /// Step active channels and advance time
    Run { rounds: u32 },
    /// Step one channel once
    Step { channel: u32 },
    /// Advance time without stepping
    Advance { cycles: u32 },
}

fn default_width() -> u32 {
    4
}

fn parse_hex_or_dec(s: &str) -> Result<u32, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

/// Stand-in for the IPU decoder core: consume the input FIFO
fn run_decoder(hw: &mut Hardware, loopback: bool) {
    let mut consumed = 0;
    while hw.ipu().out_fifo().free() > 0 || !loopback {
        let Some(qword) = hw.ipu_mut().in_fifo_mut().pop() else {
            break;
        };
        if loopback {
            hw.ipu_mut().out_fifo_mut().push(qword);
        }
        consumed += 1;
    }
    if consumed > 0 {
        log::debug!("decoder: consumed {} qwords", consumed);
        if hw.ipu().in_fifo().is_empty() && !hw.channel(ChannelId::ToIpu).is_active() {
            hw.intc_mut().request(interrupts::IPU);
        }
    }
}

fn replay(hw: &mut Hardware, script: &Script, args: &Args) -> Result<(), EmulatorError> {
    for (i, op) in script.ops.iter().enumerate() {
        match *op {
            Op::Write {
                address,
                value,
                width,
            } => {
                hw.write(width, address, value as u128)?;
            }
            Op::Read { address, width } => {
                let value = hw.read(width, address)?;
                log::info!("#{} read{} [0x{:08X}] = 0x{:X}", i, width * 8, address, value);
            }
            Op::Run { rounds } => {
                for _ in 0..rounds {
                    hw.step_active();
                    run_decoder(hw, args.loopback);
                    hw.advance(args.cycles_per_round);
                }
            }
            Op::Step { channel } => {
                let ch = ChannelId::from_index(channel as usize)
                    .ok_or(EmulatorError::InvalidChannel(channel))?;
                let outcome = hw.step_channel(ch);
                log::info!("#{} step {}: {:?}", i, ch.name(), outcome);
            }
            Op::Advance { cycles } => hw.advance(cycles),
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // .env is optional
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut config = match &args.config {
        Some(path) => HwConfig::load(path)?,
        None => HwConfig::default(),
    };
    config.apply_env();
    let mut hw = Hardware::new(config)?;

    if let Some(path) = &args.image {
        let data = std::fs::read(path)?;
        let loaded = hw.memory_mut().load(args.load_addr, &data);
        log::info!(
            "Loaded {} of {} bytes from {} at 0x{:08X}",
            loaded,
            data.len(),
            path.display(),
            args.load_addr
        );
    }

    let script: Script = toml::from_str(&std::fs::read_to_string(&args.script)?)?;
    log::info!("Replaying {} ops from {}", script.ops.len(), args.script.display());
    replay(&mut hw, &script, &args)?;

    let mut state = hw.freeze();
    if !args.registers {
        state.registers.clear();
    }
    let json = serde_json::to_string_pretty(&state)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("State written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
