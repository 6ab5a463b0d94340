// This file is part of the fxt65 crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

// FxT-65 emulator core demo CLI (SPEC_FULL.md §2, §6). Wires a `System`
// together from a ROM image and an optional SD card image, drives it at
// the configured clock rate, and dumps rendered frames out as PPM so the
// core is exercisable without a real GPU/audio host layer (out of scope
// per spec.md §1).

mod cli;
mod ppm;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use fxt65_core::Terminal;
use fxt65_emu::config::Config;
use fxt65_emu::cpu_stub::NullCpu;
use fxt65_emu::system::System;
use structopt::StructOpt;

struct StdoutTerminal;

impl Terminal for StdoutTerminal {
    fn write_byte(&mut self, value: u8) {
        let _ = io::stdout().write_all(&[value]);
    }
}

fn resolve_sd_path(opt: &cli::Opt) -> Option<std::path::PathBuf> {
    if let Some(path) = &opt.sd {
        return Some(path.clone());
    }
    cli::default_sd_candidates()
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(|p| p.to_path_buf())
}

fn run() -> Result<()> {
    let opt = cli::Opt::from_args();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &opt.loglevel);
    }
    env_logger::init();

    let rom = fxt65_loader::load_rom(&opt.rom).context("loading ROM image")?;
    let cfg = Config::new(opt.cpu_hz, opt.speed);
    let mut system = System::new(cfg, &rom, Box::new(NullCpu::new()));
    system.set_terminal(Box::new(StdoutTerminal));
    system.set_sd_strict_crc(opt.sd_strict_crc);

    if let Some(sd_path) = resolve_sd_path(&opt) {
        let backend = fxt65_loader::mount_sd_image(&sd_path)
            .with_context(|| format!("mounting SD image {}", sd_path.display()))?;
        system.mount_img(backend);
    } else {
        log::info!("no SD image found; running without a mounted card");
    }

    std::fs::create_dir_all(&opt.out)
        .with_context(|| format!("creating output directory {}", opt.out.display()))?;
    let mut video = ppm::PpmVideoSink::new(&opt.out);

    let cycles_per_frame = cfg.vblank_period() as u64;
    for frame in 0..opt.frames {
        for _ in 0..cycles_per_frame {
            system.tick();
        }
        system.render_frame(&mut video);
        log::debug!("rendered frame {}", frame);
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fxt65: {:#}", err);
        std::process::exit(1);
    }
}
