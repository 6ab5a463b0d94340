// This file is part of the fxt65-emu crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! The FxT-65 peripherals and the `System` that wires them to a 65C02
//! core: a VIA, an SPI-mode SD card, a PS/2 serial device, the Chdz
//! framebuffer engine, and the system clock that drives them all.

pub mod chdz;
pub mod config;
pub mod cpu_stub;
pub mod keytrans;
pub mod ps2;
pub mod sd;
pub mod system;
pub mod via;

pub use config::Config;
pub use sd::{MemImage, Sd, SdImage};
pub use system::System;
