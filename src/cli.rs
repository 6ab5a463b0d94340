// This file is part of the fxt65 crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// Command-line flags for the FxT-65 demo CLI (SPEC_FULL.md §6).

use std::path::PathBuf;

use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "fxt65", about = "FxT-65 emulator core demo")]
pub struct Opt {
    /// CPU clock rate in Hz.
    #[structopt(long, default_value = "8000000")]
    pub cpu_hz: u32,

    /// Simulation speed multiplier (unused by the headless demo loop, but
    /// carried through to `Config` for anything that wants it).
    #[structopt(long, default_value = "1.0")]
    pub speed: f64,

    /// Path to the 8192-byte ROM image.
    #[structopt(long, parse(from_os_str))]
    pub rom: PathBuf,

    /// Path to an SD card image (flat, fixed VHD, or dynamic VHD). Falls
    /// back to probing `sdcard.vhd` then `sdcard.img` in the current
    /// directory when omitted.
    #[structopt(long, parse(from_os_str))]
    pub sd: Option<PathBuf>,

    /// Number of rendered frames to run before exiting.
    #[structopt(long, default_value = "1")]
    pub frames: u32,

    /// Directory to write numbered PPM frames into.
    #[structopt(long, parse(from_os_str), default_value = ".")]
    pub out: PathBuf,

    /// Log level passed through to `env_logger` if `RUST_LOG` is unset.
    #[structopt(long, default_value = "info")]
    pub loglevel: String,

    /// Append the two `0xFF` SD-SPI CRC bytes after block reads (spec.md
    /// §9 "SD CRC omission"); off by default since the reference host
    /// firmware doesn't consume them.
    #[structopt(long)]
    pub sd_strict_crc: bool,
}

/// The SD image probing order when `--sd` is not given (SPEC_FULL.md §6).
pub fn default_sd_candidates() -> [&'static str; 2] {
    ["sdcard.vhd", "sdcard.img"]
}
