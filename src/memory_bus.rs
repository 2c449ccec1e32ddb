//! The flat 64 KiB address bus. Owns every collaborator that only the bus
//! needs to reach directly: the cartridge controller, timer, serial port,
//! APU, joypad, interrupt controller and clock. The PPU is kept as a
//! sibling at the system-facade level and is handed `&mut MemoryBus` on
//! each step, same as the CPU.

use crate::apu::Apu;
use crate::cartridge::CartridgeHeader;
use crate::clock::Clock;
use crate::error::EmuError;
use crate::interrupts::{InterruptController, InterruptKind};
use crate::joypad::{Joypad, JoypadButtons};
use crate::mbc3::Mbc3;
use crate::memory_map::*;
use crate::rtc::{SystemTimeSource, TimeSource};
use crate::serial::Serial;
use crate::timer::Timer;
use std::fmt;

/// OAM DMA transfers take 160 M-cycles (640 T-cycles at normal speed) and
/// lock the bus to everything but HRAM for their duration.
const OAM_DMA_DURATION_CYCLES: u32 = 640;

struct OamDma {
    active: bool,
    source_base: u16,
    cycles_remaining: u32,
    /// Bytes read from the source region at DMA start; copied into OAM
    /// atomically once the transfer completes, not as they're read.
    pending: [u8; OAM_SIZE],
}

impl Default for OamDma {
    fn default() -> Self {
        OamDma {
            active: false,
            source_base: 0,
            cycles_remaining: 0,
            pending: [0; OAM_SIZE],
        }
    }
}

/// Represents the Game Boy's memory map, owning all bus-side peripherals.
pub struct MemoryBus {
    vram: Box<[u8; VRAM_SIZE]>,
    wram_bank_0: Box<[u8; WRAM_BANK_0_SIZE]>,
    wram_bank_n: Box<[u8; WRAM_BANK_N_SIZE]>,
    oam: Box<[u8; OAM_SIZE]>,
    io_registers: Box<[u8; IO_REGISTERS_SIZE]>,
    hram: Box<[u8; HRAM_SIZE]>,

    cartridge: Option<Mbc3>,
    cartridge_has_battery: bool,

    timer: Timer,
    serial: Serial,
    apu: Apu,
    pub joypad: Joypad,
    interrupts: InterruptController,
    clock: Clock,

    dma: OamDma,
}

impl MemoryBus {
    pub fn new() -> Self {
        let mut io_regs = [0u8; IO_REGISTERS_SIZE];
        io_regs[(LCDC_ADDR - IO_REGISTERS_START) as usize] = 0x91;
        io_regs[(STAT_ADDR - IO_REGISTERS_START) as usize] = 0x85;
        io_regs[(BGP_ADDR - IO_REGISTERS_START) as usize] = 0xFC;
        io_regs[(OBP0_ADDR - IO_REGISTERS_START) as usize] = 0xFF;
        io_regs[(OBP1_ADDR - IO_REGISTERS_START) as usize] = 0xFF;
        io_regs[(DMA_ADDR - IO_REGISTERS_START) as usize] = 0xFF;

        MemoryBus {
            vram: Box::new([0; VRAM_SIZE]),
            wram_bank_0: Box::new([0; WRAM_BANK_0_SIZE]),
            wram_bank_n: Box::new([0; WRAM_BANK_N_SIZE]),
            oam: Box::new([0; OAM_SIZE]),
            io_registers: Box::new(io_regs),
            hram: Box::new([0; HRAM_SIZE]),

            cartridge: None,
            cartridge_has_battery: false,

            timer: Timer::new(),
            serial: Serial::new(),
            apu: Apu::new(),
            joypad: Joypad::new(),
            interrupts: InterruptController::new(),
            clock: Clock::new(),

            dma: OamDma::default(),
        }
    }

    /// Parses and installs a cartridge image, replacing any previously
    /// loaded one. `saved_ram`, if present, is handed to the MBC3's
    /// `load_ram`.
    pub fn load_cartridge(&mut self, rom: &[u8], saved_ram: Option<&[u8]>) -> Result<(), EmuError> {
        let header = CartridgeHeader::parse(rom)?;
        self.cartridge_has_battery = header.variant.has_battery;
        let mut mbc3 = Mbc3::new(rom.to_vec(), &header, Box::new(SystemTimeSource));
        if let Some(data) = saved_ram {
            mbc3.load_ram(data);
        }
        self.cartridge = Some(mbc3);
        Ok(())
    }

    pub fn save_ram(&self) -> Option<Vec<u8>> {
        self.cartridge
            .as_ref()
            .and_then(|c| c.save_ram(self.cartridge_has_battery))
    }

    pub fn request_interrupt(&mut self, kind: InterruptKind) {
        self.interrupts.request(kind);
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    pub fn is_double_speed(&self) -> bool {
        self.clock.is_double_speed()
    }

    /// Called from the CPU's STOP handler; performs a speed switch if one
    /// was armed via KEY1 and reports whether the CPU should stall.
    pub fn notify_stop(&mut self) -> bool {
        self.clock.notify_stop()
    }

    pub fn cpu_is_stalled(&self) -> bool {
        self.clock.cpu_is_stalled()
    }

    pub fn drain_stall(&mut self, cycles: u32) -> u32 {
        self.clock.drain_stall(cycles)
    }

    pub fn drain_audio(&mut self) -> Vec<(f32, f32)> {
        self.apu.drain_audio()
    }

    pub fn set_input(&mut self, buttons: JoypadButtons) {
        if self.joypad.set_buttons(buttons) {
            self.request_interrupt(InterruptKind::Joypad);
        }
    }

    /// Advances every bus-owned, non-PPU collaborator by the CPU T-cycles
    /// just executed. The PPU is advanced separately by the facade (it needs
    /// `&mut MemoryBus` itself); this returns how many PPU-clock cycles the
    /// facade should step it by, per the Clock's speed conversion.
    pub fn tick(&mut self, cpu_cycles: u32) -> u32 {
        let ticked = self.clock.convert(cpu_cycles);

        if self.timer.step(ticked.timer_cycles) {
            self.request_interrupt(InterruptKind::Timer);
        }
        if self.serial.step(ticked.timer_cycles) {
            self.request_interrupt(InterruptKind::Serial);
        }
        self.apu.step(ticked.apu_cycles);

        if self.dma.active {
            self.dma.cycles_remaining = self.dma.cycles_remaining.saturating_sub(cpu_cycles);
            if self.dma.cycles_remaining == 0 {
                self.dma.active = false;
                self.oam.copy_from_slice(&self.dma.pending);
            }
        }

        ticked.ppu_cycles
    }

    // --- Read/Write ---

    pub fn read_byte(&self, addr: u16) -> u8 {
        if self.dma.active && !(HRAM_START..=HRAM_END).contains(&addr) {
            return 0xFF;
        }
        self.read_byte_unlocked(addr)
    }

    fn read_byte_unlocked(&self, addr: u16) -> u8 {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => self.cartridge_read_rom(addr),
            VRAM_START..=VRAM_END => self.vram[(addr - VRAM_START) as usize],
            EXT_RAM_START..=EXT_RAM_END => self.cartridge_read_ext(addr),
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize]
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize]
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.read_byte_unlocked(addr - 0x2000),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize],
            NOT_USABLE_START..=NOT_USABLE_END => 0xFF,
            IO_REGISTERS_START..=IO_REGISTERS_END => self.read_io(addr),
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize],
            INTERRUPT_ENABLE_REGISTER => self.interrupts.read_ie(),
        }
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            P1_JOYP_ADDR => self.joypad.read_p1(),
            SB_ADDR => self.serial.read_sb(),
            SC_ADDR => self.serial.read_sc(),
            DIV_ADDR => self.timer.read_div(),
            TIMA_ADDR => self.timer.read_tima(),
            TMA_ADDR => self.timer.read_tma(),
            TAC_ADDR => self.timer.read_tac(),
            IF_ADDR => self.interrupts.read_if(),
            KEY1_ADDR => self.clock.read_key1(),
            0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.apu.read_byte(addr),
            STAT_ADDR => self.io_registers[(addr - IO_REGISTERS_START) as usize] | 0x80,
            _ => self.io_registers[(addr - IO_REGISTERS_START) as usize],
        }
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        if self.dma.active && !(HRAM_START..=HRAM_END).contains(&addr) {
            return;
        }

        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => self.cartridge_write_control(addr, value),
            VRAM_START..=VRAM_END => self.vram[(addr - VRAM_START) as usize] = value,
            EXT_RAM_START..=EXT_RAM_END => self.cartridge_write_ext(addr, value),
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize] = value
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize] = value
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.write_byte(addr - 0x2000, value),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize] = value,
            NOT_USABLE_START..=NOT_USABLE_END => {}
            IO_REGISTERS_START..=IO_REGISTERS_END => self.write_io(addr, value),
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize] = value,
            INTERRUPT_ENABLE_REGISTER => self.interrupts.write_ie(value),
        }
    }

    fn write_io(&mut self, addr: u16, value: u8) {
        let offset = (addr - IO_REGISTERS_START) as usize;
        match addr {
            P1_JOYP_ADDR => self.joypad.write_p1(value),
            SB_ADDR => self.serial.write_sb(value),
            SC_ADDR => self.serial.write_sc(value),
            DIV_ADDR => self.timer.write_div(),
            TIMA_ADDR => self.timer.write_tima(value),
            TMA_ADDR => self.timer.write_tma(value),
            TAC_ADDR => self.timer.write_tac(value),
            IF_ADDR => self.interrupts.write_if(value),
            KEY1_ADDR => self.clock.write_key1(value),
            0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.apu.write_byte(addr, value),
            DMA_ADDR => {
                self.io_registers[offset] = value;
                self.start_oam_dma(value);
            }
            STAT_ADDR => {
                self.io_registers[offset] = (value & 0b0111_1000) | (self.io_registers[offset] & 0b1000_0111);
            }
            _ => self.io_registers[offset] = value,
        }
    }

    fn start_oam_dma(&mut self, source_high_byte: u8) {
        let source_base = (source_high_byte as u16) << 8;
        let mut pending = [0u8; OAM_SIZE];
        for i in 0..OAM_SIZE as u16 {
            pending[i as usize] = self.read_byte_unlocked(source_base + i);
        }
        self.dma.pending = pending;
        self.dma.active = true;
        self.dma.source_base = source_base;
        self.dma.cycles_remaining = OAM_DMA_DURATION_CYCLES;
    }

    fn cartridge_read_rom(&self, addr: u16) -> u8 {
        match &self.cartridge {
            Some(mbc) => mbc.read_rom(addr),
            None => 0xFF,
        }
    }

    fn cartridge_write_control(&mut self, addr: u16, value: u8) {
        if let Some(mbc) = &mut self.cartridge {
            mbc.write_control(addr, value);
        }
    }

    fn cartridge_read_ext(&self, addr: u16) -> u8 {
        match &self.cartridge {
            Some(mbc) => mbc.read_ext(addr),
            None => 0xFF,
        }
    }

    fn cartridge_write_ext(&mut self, addr: u16, value: u8) {
        if let Some(mbc) = &mut self.cartridge {
            mbc.write_ext(addr, value);
        }
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        let low = self.read_byte(addr) as u16;
        let high = self.read_byte(addr.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    pub fn write_word(&mut self, addr: u16, value: u16) {
        let low = (value & 0xFF) as u8;
        let high = (value >> 8) as u8;
        self.write_byte(addr, low);
        self.write_byte(addr.wrapping_add(1), high);
    }

    // --- Privileged accessors for the PPU, bypassing the OAM DMA lock ---

    pub fn ppu_read_vram(&self, addr: u16) -> u8 {
        self.vram[(addr - VRAM_START) as usize]
    }

    pub fn ppu_read_oam(&self, addr: u16) -> u8 {
        self.oam[(addr - OAM_START) as usize]
    }

    pub fn get_vram(&self) -> &[u8; VRAM_SIZE] {
        &self.vram
    }

    pub fn get_oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    /// Writes an I/O register without going through `write_io`'s masking,
    /// for use by the PPU when it updates LY/STAT from its own timing.
    pub fn set_io_reg_direct(&mut self, addr: u16, value: u8) {
        if (IO_REGISTERS_START..=IO_REGISTERS_END).contains(&addr) {
            self.io_registers[(addr - IO_REGISTERS_START) as usize] = value;
        } else if addr == INTERRUPT_ENABLE_REGISTER {
            self.interrupts.write_ie(value);
        }
    }

    pub fn get_io_reg(&self, addr: u16) -> u8 {
        if (IO_REGISTERS_START..=IO_REGISTERS_END).contains(&addr) {
            self.io_registers[(addr - IO_REGISTERS_START) as usize]
        } else if addr == INTERRUPT_ENABLE_REGISTER {
            self.interrupts.read_ie()
        } else {
            0xFF
        }
    }
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("dma_active", &self.dma.active)
            .field("double_speed", &self.clock.is_double_speed())
            .field("IE", &format_args!("{:#04X}", self.interrupts.read_ie()))
            .field("IF", &format_args!("{:#04X}", self.interrupts.read_if()))
            .field("joypad", &self.joypad)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hram_stays_live_during_oam_dma_lock() {
        let mut bus = MemoryBus::new();
        bus.hram[0] = 0x42;
        bus.write_byte(DMA_ADDR, 0xC0);
        assert_eq!(bus.read_byte(HRAM_START), 0x42);
        assert_eq!(bus.read_byte(WRAM_BANK_0_START), 0xFF);
    }

    #[test]
    fn oam_dma_lock_releases_after_duration() {
        let mut bus = MemoryBus::new();
        bus.write_byte(DMA_ADDR, 0xC0);
        bus.tick(OAM_DMA_DURATION_CYCLES);
        assert_eq!(bus.read_byte(WRAM_BANK_0_START), 0);
    }

    #[test]
    fn oam_is_written_atomically_only_once_dma_completes() {
        let mut bus = MemoryBus::new();
        bus.oam[0] = 0xAA;
        bus.wram_bank_0[0] = 0x55;
        bus.write_byte(DMA_ADDR, 0xC0); // source 0xC000, wram_bank_0

        // Mid-transfer, OAM must still hold its pre-DMA contents.
        bus.tick(OAM_DMA_DURATION_CYCLES - 4);
        assert_eq!(bus.ppu_read_oam(OAM_START), 0xAA);

        // Once the transfer completes, the snapshot taken at DMA start lands
        // in OAM all at once.
        bus.tick(4);
        assert_eq!(bus.ppu_read_oam(OAM_START), 0x55);
    }

    #[test]
    fn echo_ram_mirrors_wram() {
        let mut bus = MemoryBus::new();
        bus.write_byte(WRAM_BANK_0_START, 0x7A);
        assert_eq!(bus.read_byte(ECHO_RAM_START), 0x7A);
    }

    #[test]
    fn if_register_roundtrips_through_interrupt_controller() {
        let mut bus = MemoryBus::new();
        bus.write_byte(IF_ADDR, 0x05);
        assert_eq!(bus.read_byte(IF_ADDR), 0xE5);
    }
}
