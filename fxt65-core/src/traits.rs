// This file is part of the fxt65-core crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! Trait boundaries between the emulator core and its external
//! collaborators (spec.md §1: "OUT OF SCOPE"). These mirror the
//! `Cpu`/`SoundOutput`/`VideoOutput` boundary the reference emulator draws
//! between its own chipset and the parts it treats as swappable — here
//! adapted to a single concrete `System`, so there is exactly one
//! implementor of each on the hot path and a test stub for the others.

/// A bus is anything that answers a 16-bit read/write — in this crate,
/// always `fxt65_emu::System`. The CPU core is handed a `&mut dyn Bus`
/// rather than the whole `System` so the core crate stays CPU-agnostic.
pub trait Bus {
    fn read(&mut self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);
}

/// CPU-visible register selector, used only for inspection/debugging;
/// the emulator never needs to set these itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    A,
    X,
    Y,
    Sp,
    P,
}

/// The 65C02 core: an external collaborator (spec.md §1) treated as a
/// black box that executes one clock cycle per call, synchronously
/// reading/writing the bus as needed, and exposes its interrupt pins and
/// registers for inspection.
pub trait Cpu {
    /// Advance the CPU by exactly one clock cycle, performing at most the
    /// bus accesses a real 65C02 would make in that cycle.
    fn step_cycle(&mut self, bus: &mut dyn Bus);
    fn reset(&mut self);
    fn get_register(&self, reg: Register) -> u8;
    fn set_register(&mut self, reg: Register, value: u8);
    fn get_pc(&self) -> u16;
    fn set_pc(&mut self, value: u16);
    /// Level-sensitive IRQ pin.
    fn set_irq(&mut self, asserted: bool);
    /// Edge-sensitive NMI pin.
    fn set_nmi(&mut self, asserted: bool);
}

/// Host framebuffer consumer (spec.md §6 "Host framebuffer"); out of scope
/// itself, but `System::render_frame` needs somewhere to put pixels.
pub trait VideoSink {
    /// Width/height in pixels, e.g. `(256, 768)`.
    fn get_dimensions(&self) -> (usize, usize);
    /// Receive one full RGBA8 frame, top-to-bottom, row-major.
    fn write_frame(&mut self, rgba: &[u8]);
}

/// Host audio consumer (spec.md §6 "Host audio"); out of scope itself.
pub trait AudioSink {
    fn write_sample(&mut self, sample: f32);
}

/// The YMZ294-style PSG synth core (spec.md §1: out of scope, "a black box
/// producing one 16-bit sample on demand"). Mirrors how the reference
/// emulator's `Sid` chip wraps an opaque `resid::Sid` synth core behind a
/// register read/write + sample-on-demand interface.
pub trait PsgCore {
    fn read(&mut self, addr_reg: u8) -> u8;
    fn write(&mut self, addr_reg: u8, value: u8);
    /// Produce one sample; called by the host at its own sample-rate
    /// cadence, not once per CPU cycle (spec.md §6 "Host audio").
    fn sample(&mut self) -> i16;
}

/// Host stdout/terminal sink for UART output (spec.md §4.1, address
/// `0xE000` write).
pub trait Terminal {
    fn write_byte(&mut self, value: u8);
}
