// This file is part of the fxt65-emu crate.
// Copyright (c) 2024 FxT-65 emulator contributors. All rights reserved.
// Licensed under the GPLv3. See LICENSE file in the project root for full license text.

//! The machine itself: RAM, ROM, and the four mapped peripherals behind
//! one flat 16-bit address space (spec.md §4.1). `System` owns every
//! device by value — no `Rc<RefCell<_>>`, no factory, no trait-object
//! chip list — per spec.md §9's explicit "no globals" design note. Two
//! idioms keep that possible without fighting the borrow checker:
//!
//! - the VIA/SD coupling (an SR write/read triggers an SPI exchange) is
//!   done by destructuring `&mut self` into its fields so `via` and `sd`
//!   can be borrowed independently in the same statement;
//! - the CPU is temporarily taken out of `self` for the duration of
//!   `step_cycle`, since that call needs `&mut dyn Bus` from `self`
//!   itself, which `self` cannot lend out while also owning the callee.

use fxt65_core::{AudioSink, Bus, Cpu, PsgCore, Ram, Rom, Terminal, VideoSink};
use log::{debug, info};

use crate::chdz::Chdz;
use crate::config::Config;
use crate::keytrans::{self, KeyCode};
use crate::ps2::Ps2;
use crate::sd::{Sd, SdImage};
use crate::via::{self, Via};

const RAM_SIZE: usize = 0x8000;
const RAM_END: u16 = 0x7FFF;
const UART_RX: u16 = 0xE000;
const UART_STATUS: u16 = 0xE001;
const UART_STATUS_RX_READY: u8 = 0x08;
const VIA_BASE: u16 = 0xE200;
const VIA_END: u16 = 0xE20E;
const PSG_ADDR_SEL: u16 = 0xE400;
const PSG_DATA: u16 = 0xE401;
const CHDZ_BASE: u16 = 0xE600;
const CHDZ_END: u16 = 0xE607;
const ROM_BASE: u16 = 0xF000;

/// Discards PSG register traffic; used by the demo CLI and by tests that
/// don't care about audio (spec.md §1: the synth core is out of scope).
pub struct NullPsg;

impl PsgCore for NullPsg {
    fn read(&mut self, _addr_reg: u8) -> u8 {
        0
    }
    fn write(&mut self, _addr_reg: u8, _value: u8) {}
    fn sample(&mut self) -> i16 {
        0
    }
}

/// Discards UART output; used the same way `NullPsg` is.
pub struct NullTerminal;

impl Terminal for NullTerminal {
    fn write_byte(&mut self, _value: u8) {}
}

pub struct System {
    ram: Ram,
    rom: Rom,
    via: Via,
    sd: Sd,
    ps2: Ps2,
    chdz: Chdz,
    psg: Box<dyn PsgCore>,
    terminal: Box<dyn Terminal>,
    cpu: Option<Box<dyn Cpu>>,
    cfg: Config,
    psg_addr: u8,
    uart_input_buffer: u8,
    uart_status: u8,
    vblank_accum: u32,
    ps2_accum: u32,
    nmi_active: bool,
    nmi_remaining: u32,
    /// The level last handed to `Cpu::set_nmi`, kept around purely so
    /// tests can observe the pulse without a CPU stub exposing its own
    /// pin state; mirrors `nmi_pending()` on `NullCpu` but from the
    /// driver's side.
    nmi_line: bool,
}

impl System {
    pub fn new(cfg: Config, rom_data: &[u8], cpu: Box<dyn Cpu>) -> Self {
        info!("constructing system: cpu_hz={} sim_speed={}", cfg.cpu_hz, cfg.sim_speed);
        Self {
            ram: Ram::new(RAM_SIZE),
            rom: Rom::new_with_data(rom_data),
            via: Via::new(),
            sd: Sd::new(Box::new(crate::sd::MemImage::new(0))),
            ps2: Ps2::new(),
            chdz: Chdz::new(),
            psg: Box::new(NullPsg),
            terminal: Box::new(NullTerminal),
            cpu: Some(cpu),
            cfg,
            psg_addr: 0,
            uart_input_buffer: 0,
            uart_status: 0,
            vblank_accum: 0,
            ps2_accum: 0,
            nmi_active: false,
            nmi_remaining: 0,
            nmi_line: false,
        }
    }

    pub fn set_psg(&mut self, psg: Box<dyn PsgCore>) {
        self.psg = psg;
    }

    pub fn set_terminal(&mut self, terminal: Box<dyn Terminal>) {
        self.terminal = terminal;
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Exposed for tests and debugger front-ends that want to inspect
    /// Chdz state directly, the same way `Chdz::write`/`cursor` are.
    pub fn chdz(&self) -> &Chdz {
        &self.chdz
    }

    pub fn reset(&mut self) {
        self.via.reset();
        self.sd.reset();
        self.ps2.reset();
        self.chdz.reset();
        self.uart_input_buffer = 0;
        self.uart_status = 0;
        self.vblank_accum = 0;
        self.ps2_accum = 0;
        self.nmi_active = false;
        self.nmi_remaining = 0;
        self.nmi_line = false;
        if let Some(cpu) = self.cpu.as_mut() {
            cpu.reset();
        }
    }

    /// Mounts an SD backend (spec.md §6 `MountImg`).
    pub fn mount_img(&mut self, backend: Box<dyn SdImage>) {
        info!("mounting sd image: {} sectors", backend.total_sectors());
        self.sd.mount(backend);
    }

    /// Unmounts the current SD backend (spec.md §6 `UnmountImg`).
    pub fn unmount_img(&mut self) {
        info!("unmounting sd image");
        self.sd.unmount();
    }

    /// Opts the SD device into the strict two-byte `0xFF` CRC trailer
    /// after block reads (spec.md §9, SPEC_FULL.md §9 `SdConfig.strict_crc`).
    /// Off by default.
    pub fn set_sd_strict_crc(&mut self, enabled: bool) {
        self.sd.set_strict_crc(enabled);
    }

    pub fn key_down(&mut self, key: KeyCode) {
        if let Some(scancode) = keytrans::translate(key) {
            self.ps2.enqueue_scancode(scancode, false);
        }
    }

    pub fn key_up(&mut self, key: KeyCode) {
        if let Some(scancode) = keytrans::translate(key) {
            self.ps2.enqueue_scancode(scancode, true);
        }
    }

    /// Delivers one byte into the UART's single-byte receive buffer and
    /// sets `uart_status` bit 3 (RxReady) so the next `0xE000` read picks
    /// it up (spec.md §3 "uart_input_buffer", §4.1). The host-side serial
    /// line itself is out of scope (spec.md §1); this is the seam a
    /// terminal-raw-mode host layer would call into.
    pub fn uart_receive(&mut self, byte: u8) {
        self.uart_input_buffer = byte;
        self.uart_status |= UART_STATUS_RX_READY;
    }

    /// Pulses NMI for `cycles` ticks (spec.md §4.6: host-driven, e.g. a
    /// Ctrl+N shortcut — not periodic, unlike VBLANK).
    pub fn pulse_nmi(&mut self, cycles: u32) {
        self.arm_nmi(cycles.max(1));
    }

    pub fn render_frame(&self, sink: &mut dyn VideoSink) {
        sink.write_frame(&self.chdz.render_frame());
    }

    /// Pulls one sample out of the PSG for the host audio sink (spec.md
    /// §6 "Host audio"); called by the host at its own sample-rate
    /// cadence, independent of `Tick`.
    pub fn sample_audio(&mut self, sink: &mut dyn AudioSink) {
        let sample = self.psg.sample();
        sink.write_sample(sample as f32 / i16::MAX as f32);
    }

    fn arm_nmi(&mut self, cycles: u32) {
        self.nmi_active = true;
        self.nmi_remaining = cycles;
    }

    /// Advances the whole machine by one CPU clock cycle (spec.md §4.6).
    pub fn tick(&mut self) {
        let mut cpu = self.cpu.take().expect("cpu always present between ticks");
        cpu.step_cycle(self);
        self.via.tick();
        cpu.set_irq(self.irq_asserted());
        // The line level set here takes effect on the *next* call's
        // `step_cycle`, so it must be driven every tick (not only while
        // `nmi_active`) or a one-cycle pulse would be armed and cleared
        // before any `step_cycle` ever observed it asserted.
        cpu.set_nmi(self.nmi_active);
        self.nmi_line = self.nmi_active;
        if self.nmi_active {
            self.nmi_remaining -= 1;
            if self.nmi_remaining == 0 {
                self.nmi_active = false;
            }
        }
        self.cpu = Some(cpu);

        self.ps2_accum += 1;
        if self.ps2_accum >= self.cfg.ps2_half_period() {
            self.ps2_accum = 0;
            let ddrb = self.via.ddrb();
            let orb = self.via.orb();
            let host_clk_low = (ddrb & 0x20 != 0) && (orb & 0x20 == 0);
            let host_dat_low = (ddrb & 0x10 != 0) && (orb & 0x10 == 0);
            self.ps2.tick(host_clk_low, host_dat_low);
        }

        self.vblank_accum += 1;
        if self.vblank_accum >= self.cfg.vblank_period() {
            self.vblank_accum = 0;
            self.via.raise_flag(via::VBLANK_FLAG);
            debug!("vblank");
        }
    }

    /// `UpdateIrq` (spec.md §4.6): the IRQ line is the OR of the UART's
    /// RxReady flag and the VIA's own IFR/IER aggregation.
    fn irq_asserted(&self) -> bool {
        let uart_irq = self.uart_status & UART_STATUS_RX_READY != 0;
        let via_irq = self.via.irq_asserted();
        uart_irq || via_irq
    }

    /// Port B input OR-in (spec.md §9 open question, resolved in
    /// DESIGN.md): for any bit `DDRB` marks as input, the bus sees the
    /// PS/2 device's current line level instead of the VIA's own output
    /// latch, mirroring the reference CIA's `IoPort::get_value` blend of
    /// an output latch with externally driven input bits.
    fn read_via_orb(&mut self) -> u8 {
        let ddrb = self.via.ddrb();
        let orb = self.via.orb();
        let ps2_bits = self.ps2.port_b_bits();
        (orb & ddrb) | (ps2_bits & !ddrb)
    }

    pub fn bus_read(&mut self, address: u16) -> u8 {
        match address {
            0x0000..=RAM_END => self.ram.read(address),
            UART_RX => {
                let value = self.uart_input_buffer;
                self.uart_status &= !UART_STATUS_RX_READY;
                value
            }
            UART_STATUS => self.uart_status,
            VIA_BASE..=VIA_END => {
                if address - VIA_BASE == via::reg::ORB {
                    self.read_via_orb()
                } else if address - VIA_BASE == via::reg::SR && self.via.spi_read_mode() {
                    let miso = self.sd.transfer(0xFF);
                    self.via.complete_sr_read(miso);
                    self.via.read(via::reg::SR)
                } else {
                    self.via.read(address - VIA_BASE)
                }
            }
            PSG_DATA => self.psg.read(self.psg_addr),
            ROM_BASE..=0xFFFF => self.rom.read(address),
            _ => 0,
        }
    }

    pub fn bus_write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=RAM_END => self.ram.write(address, value),
            UART_RX => self.terminal.write_byte(value),
            CHDZ_BASE..=CHDZ_END => self.chdz.write(address - CHDZ_BASE, value),
            VIA_BASE..=VIA_END => {
                let offset = address - VIA_BASE;
                if offset == via::reg::ORB {
                    self.via.write(offset, value);
                    self.sd.set_cs_active(value & 0x40 == 0);
                } else if offset == via::reg::SR {
                    self.via.begin_sr_write();
                    let miso = self.sd.transfer(value);
                    self.via.complete_sr_exchange(miso);
                } else {
                    self.via.write(offset, value);
                }
            }
            PSG_ADDR_SEL => self.psg_addr = value,
            PSG_DATA => self.psg.write(self.psg_addr, value),
            ROM_BASE..=0xFFFF => self.rom.write(address, value),
            _ => {}
        }
    }
}

impl Bus for System {
    fn read(&mut self, address: u16) -> u8 {
        self.bus_read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        self.bus_write(address, value)
    }
}
