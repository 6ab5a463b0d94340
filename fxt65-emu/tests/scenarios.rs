// This file is part of the fxt65-emu crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! End-to-end scenarios driven directly against a `System` with a no-op
//! CPU stub, the way the reference emulator's `cia_timing.rs` drives a
//! `Cia` directly without a real 6502 core (spec.md §8).

use fxt65_emu::config::Config;
use fxt65_emu::cpu_stub::NullCpu;
use fxt65_emu::keytrans::KeyCode;
use fxt65_emu::sd::MemImage;
use fxt65_emu::system::System;
use fxt65_emu::via;

const VIA_BASE: u16 = 0xE200;
const CHDZ_BASE: u16 = 0xE600;

fn system_with_rom() -> System {
    let cfg = Config::new(8_000_000, 1.0);
    let rom = vec![0u8; 4096];
    System::new(cfg, &rom, Box::new(NullCpu::new()))
}

fn select_card(sys: &mut System) {
    sys.bus_write(VIA_BASE + via::reg::DDRB, 0x40);
    sys.bus_write(VIA_BASE + via::reg::ORB, 0x00);
}

fn spi_byte(sys: &mut System, mosi: u8) -> u8 {
    sys.bus_write(VIA_BASE + via::reg::SR, mosi);
    sys.bus_read(VIA_BASE + via::reg::SR)
}

#[test]
fn sd_init_handshake_reaches_idle_state() {
    let mut sys = system_with_rom();
    sys.mount_img(Box::new(MemImage::new(4096)));
    select_card(&mut sys);

    let cmd0 = [0x40, 0, 0, 0, 0, 0x95];
    for byte in cmd0.iter() {
        spi_byte(&mut sys, *byte);
    }
    let mut got_r1 = false;
    for _ in 0..8 {
        if spi_byte(&mut sys, 0xFF) == 0x01 {
            got_r1 = true;
        }
    }
    assert!(got_r1, "CMD0 should eventually return R1 = 0x01 (idle)");
}

#[test]
fn sd_block_write_then_read_round_trips() {
    let mut sys = system_with_rom();
    sys.mount_img(Box::new(MemImage::new(4096)));
    select_card(&mut sys);

    for byte in [0x58u8, 0, 0, 0, 0, 0x01].iter() {
        spi_byte(&mut sys, *byte);
    }
    for _ in 0..4 {
        spi_byte(&mut sys, 0xFF);
    }
    spi_byte(&mut sys, 0xFE);
    for _ in 0..512 {
        spi_byte(&mut sys, 0x7E);
    }
    let mut accepted = false;
    for _ in 0..6 {
        if spi_byte(&mut sys, 0xFF) == 0x05 {
            accepted = true;
        }
    }
    assert!(accepted);

    for byte in [0x51u8, 0, 0, 0, 0, 0x01].iter() {
        spi_byte(&mut sys, *byte);
    }
    let mut stream = Vec::new();
    for _ in 0..520 {
        stream.push(spi_byte(&mut sys, 0xFF));
    }
    let token = stream.iter().position(|&b| b == 0xFE).unwrap();
    assert!(stream[token + 1..token + 1 + 512].iter().all(|&b| b == 0x7E));
}

#[test]
fn sr_read_in_spi_read_mode_pumps_sd_and_clears_shift_flag() {
    let mut sys = system_with_rom();
    sys.mount_img(Box::new(MemImage::new(4096)));
    select_card(&mut sys);
    sys.bus_write(VIA_BASE + via::reg::IER, 0x80 | 0x04);

    // An SR write leaves the shift-complete flag set (ACR still in its
    // default, non-SPI-read mode here, so the write's own `bus_read(SR)`
    // inside `spi_byte` doesn't also pump the SD device).
    spi_byte(&mut sys, 0x40);
    assert_ne!(0, sys.bus_read(VIA_BASE + via::reg::IFR) & 0x04);

    // Switching ACR into SPI-read mode and reading SR must pump another
    // SPI exchange and *clear* bit 2 again, never re-assert it (spec.md
    // §4.3, §9 "Reads with side effects").
    sys.bus_write(VIA_BASE + via::reg::ACR, 0x08);
    let miso = sys.bus_read(VIA_BASE + via::reg::SR);
    assert_eq!(0xFF, miso, "mid-command NCR padding byte is always 0xFF");
    let ifr = sys.bus_read(VIA_BASE + via::reg::IFR);
    assert_eq!(0, ifr & 0x04, "SR read must clear bit 2, not leave it set");
    assert_eq!(0, ifr & 0x80, "with bit 2 clear and no other flags, master bit must be clear too");
}

#[test]
fn via_timer1_one_shot_raises_irq_when_enabled() {
    let mut sys = system_with_rom();
    sys.bus_write(VIA_BASE + via::reg::IER, 0x80 | 0x40);
    sys.bus_write(VIA_BASE + via::reg::T1CL, 0x05);
    sys.bus_write(VIA_BASE + via::reg::T1CH, 0x00);
    for _ in 0..6 {
        sys.tick();
    }
    assert_ne!(0, sys.bus_read(VIA_BASE + via::reg::IFR) & 0x40);
}

#[test]
fn key_down_a_enqueues_ps2_frame() {
    let mut sys = system_with_rom();
    sys.key_down(KeyCode::A);
    // Run enough ticks for the PS/2 device to start draining its queue;
    // this only asserts it doesn't panic and the queue eventually drains,
    // since observing individual wire bits needs the port-B wiring test.
    for _ in 0..2000 {
        sys.tick();
    }
}

#[test]
fn chdz_write_advances_cursor_by_one_with_charbox_disabled() {
    let mut sys = system_with_rom();
    sys.bus_write(CHDZ_BASE + fxt65_emu::chdz::reg::WDAT, 0x0F);
    // Default CHRW leaves the character box disabled (bit 7 set), so a
    // write just advances the cursor linearly through VRAM.
    sys.bus_write(CHDZ_BASE + fxt65_emu::chdz::reg::WDAT, 0x0F);
    assert_eq!(2, sys.chdz().cursor());
}

#[test]
fn vblank_cadence_raises_via_ifr_after_configured_period() {
    let mut sys = system_with_rom();
    sys.bus_write(VIA_BASE + via::reg::IER, 0x80 | 0x01);
    let period = sys.config().vblank_period();
    for _ in 0..period - 1 {
        sys.tick();
    }
    assert_eq!(0x00, sys.bus_read(VIA_BASE + via::reg::IFR) & 0x01);
    sys.tick();
    assert_eq!(0x01, sys.bus_read(VIA_BASE + via::reg::IFR) & 0x01);
}
