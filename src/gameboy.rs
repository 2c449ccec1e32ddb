//! The system facade: owns the CPU, PPU and bus, and is the one type a host
//! embeds. Mirrors the teacher's `Emulator { cpu, ppu, apu, memory_bus }`
//! grouping, but the APU now lives inside [`MemoryBus`] since it's a pure
//! register/ring-buffer collaborator with no need to be a facade-level
//! sibling the way the PPU is.

use crate::cpu::Cpu;
use crate::error::{log_break, BreakSink, EmuError, NullBreakSink};
use crate::joypad::JoypadButtons;
use crate::memory_bus::MemoryBus;
use crate::ppu::{Frame, Ppu};

/// Top-level emulator instance. Construct with [`GameBoy::new`], load a
/// cartridge, then drive it with repeated [`GameBoy::step`] calls.
pub struct GameBoy {
    cpu: Cpu,
    ppu: Ppu,
    bus: MemoryBus,
    break_sink: Box<dyn BreakSink>,
}

impl GameBoy {
    /// Creates a fresh instance. `skip_boot_rom` starts the CPU directly at
    /// the post-boot register state instead of executing the boot ROM.
    pub fn new(skip_boot_rom: bool) -> Self {
        let mut bus = MemoryBus::new();
        let cpu = Cpu::new(skip_boot_rom);
        if skip_boot_rom {
            Cpu::initialize_post_boot_io(&mut bus);
        }
        GameBoy {
            cpu,
            ppu: Ppu::new(),
            bus,
            break_sink: Box::new(NullBreakSink),
        }
    }

    /// Installs a host-supplied sink for fatal diagnostics. Replaces any
    /// previously installed sink.
    pub fn set_break_sink(&mut self, sink: Box<dyn BreakSink>) {
        self.break_sink = sink;
    }

    /// Resets the machine to its post-construction state, as if freshly
    /// powered on with the same boot-ROM setting. Any loaded cartridge is
    /// dropped; reload it after calling this.
    pub fn reset(&mut self, skip_boot_rom: bool) {
        *self = GameBoy::new(skip_boot_rom);
    }

    /// Parses and installs a cartridge image, optionally seeding its
    /// battery-backed RAM (and RTC, if present) from a previous save.
    pub fn load_cartridge(&mut self, image: &[u8], saved_ram: Option<&[u8]>) -> Result<(), EmuError> {
        self.bus.load_cartridge(image, saved_ram).map_err(|e| {
            log_break(&e);
            self.break_sink.on_break(&e);
            e
        })
    }

    /// Runs `cpu_instructions` CPU instructions, fanning each instruction's
    /// cycles out to the bus-owned peripherals and the PPU, and returns the
    /// total CPU T-cycles consumed. Stops early and returns `Err` on the
    /// first invalid opcode.
    pub fn step(&mut self, cpu_instructions: u32) -> Result<u32, EmuError> {
        let mut total_cycles: u32 = 0;
        for _ in 0..cpu_instructions {
            let cycles = self.cpu.step(&mut self.bus).map_err(|_| {
                let error = EmuError::InvalidOpcode {
                    opcode: self.cpu.fetched_opcode(),
                    pc: self.cpu.pc(),
                };
                log_break(&error);
                self.break_sink.on_break(&error);
                error
            })? as u32;

            let ppu_cycles = self.bus.tick(cycles);
            self.ppu.step(ppu_cycles, &mut self.bus);

            total_cycles += cycles;
        }
        Ok(total_cycles)
    }

    /// The most recently completed frame, paired with its sequence number.
    pub fn frame(&self) -> Frame<'_> {
        self.ppu.frame()
    }

    /// Drains every audio sample buffered since the last call.
    pub fn drain_audio(&mut self) -> Vec<(f32, f32)> {
        self.bus.drain_audio()
    }

    /// Replaces the full joypad button state, requesting a Joypad interrupt
    /// if any selected button transitioned released -> pressed.
    pub fn set_input(&mut self, buttons: JoypadButtons) {
        self.bus.set_input(buttons);
    }

    /// Returns the cartridge's battery-backed RAM (and RTC state) for
    /// persistence, if the loaded cartridge has a battery.
    pub fn save_ram(&self) -> Option<Vec<u8>> {
        self.bus.save_ram()
    }

    /// Direct access to the bus, for a host that wants to drive a debugger
    /// UI (disassembly, memory inspector) alongside normal stepping.
    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    /// Mutable access to the PPU, for a host updating its own debug views
    /// (e.g. a VRAM tile viewer) against the current bus state.
    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    /// Refreshes the PPU's VRAM tile debug view against the current bus
    /// contents. Has no effect on emulation; purely a host debug aid.
    pub fn update_vram_debug(&mut self) {
        self.ppu.update_vram_debug_buffer(&self.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x147] = 0x11; // MBC3, no RAM/battery
        rom[0x148] = 0x00; // 2 ROM banks (32 KiB)
        rom[0x149] = 0x00; // no RAM
        rom
    }

    #[test]
    fn new_machine_boots_with_blank_frame() {
        let gb = GameBoy::new(true);
        let frame = gb.frame();
        assert_eq!(frame.index, 0);
        assert!(frame.buffer.iter().all(|&px| px == 0xFFFFFFFF));
    }

    #[test]
    fn rejects_unsupported_cartridge_type() {
        let mut gb = GameBoy::new(true);
        let mut rom = vec![0u8; 0x8000];
        rom[0x147] = 0x01; // plain MBC1, not MBC3
        assert!(gb.load_cartridge(&rom, None).is_err());
    }

    #[test]
    fn step_executes_instructions_and_advances_cycles() {
        let mut gb = GameBoy::new(true);
        gb.load_cartridge(&blank_rom(), None).unwrap();
        // ROM is all zeroes -> NOP (0x00) at every address, 4 cycles each.
        let cycles = gb.step(10).unwrap();
        assert_eq!(cycles, 40);
    }
}
