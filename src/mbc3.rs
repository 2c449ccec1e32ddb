//! MBC3 bank switching, RAM gating, and RTC register routing.

use crate::cartridge::CartridgeHeader;
use crate::rtc::{RtcRegisters, TimeSource};

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

pub struct Mbc3 {
    rom: Vec<u8>,
    ram: Vec<u8>,
    has_ram: bool,
    has_timer: bool,
    rom_bank_count: usize,
    ram_bank_count: usize,

    ram_enabled: bool,
    rom_bank: u8,
    /// 0x00..=0x03 selects a RAM bank; 0x08..=0x0C selects an RTC register.
    ram_or_rtc_select: u8,

    rtc: RtcRegisters,
}

impl Mbc3 {
    pub fn new(rom: Vec<u8>, header: &CartridgeHeader, time_source: Box<dyn TimeSource + Send>) -> Self {
        let ram = vec![0u8; header.ram_bytes()];
        Mbc3 {
            rom,
            ram,
            has_ram: header.variant.has_ram,
            has_timer: header.variant.has_timer,
            rom_bank_count: header.rom_bank_count,
            ram_bank_count: header.ram_bank_count,
            ram_enabled: false,
            rom_bank: 1,
            ram_or_rtc_select: 0,
            rtc: RtcRegisters::new(time_source),
        }
    }

    fn effective_rom_bank(&self) -> usize {
        (self.rom_bank as usize) % self.rom_bank_count.max(1)
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0x7FFF => {
                let bank = self.effective_rom_bank();
                let offset = bank * ROM_BANK_SIZE + (addr - 0x4000) as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            _ => 0xFF,
        }
    }

    pub fn write_control(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x3FFF => {
                let masked = value & 0x7F;
                self.rom_bank = if masked == 0 { 1 } else { masked };
            }
            0x4000..=0x5FFF => self.ram_or_rtc_select = value,
            0x6000..=0x7FFF => {
                if self.has_timer {
                    self.rtc.handle_latch_write(value);
                }
            }
            _ => {}
        }
    }

    pub fn read_ext(&self, addr: u16) -> u8 {
        if !self.ram_enabled {
            return 0xFF;
        }
        match self.ram_or_rtc_select {
            0x00..=0x03 if self.has_ram => {
                let bank = (self.ram_or_rtc_select as usize) % self.ram_bank_count.max(1);
                let offset = bank * RAM_BANK_SIZE + (addr - 0xA000) as usize;
                self.ram.get(offset).copied().unwrap_or(0xFF)
            }
            0x08..=0x0C if self.has_timer => self.rtc.read(self.ram_or_rtc_select),
            _ => 0xFF,
        }
    }

    pub fn write_ext(&mut self, addr: u16, value: u8) {
        if !self.ram_enabled {
            return;
        }
        match self.ram_or_rtc_select {
            0x00..=0x03 if self.has_ram => {
                let bank = (self.ram_or_rtc_select as usize) % self.ram_bank_count.max(1);
                let offset = bank * RAM_BANK_SIZE + (addr - 0xA000) as usize;
                if let Some(slot) = self.ram.get_mut(offset) {
                    *slot = value;
                }
            }
            0x08..=0x0C if self.has_timer => self.rtc.write(self.ram_or_rtc_select, value),
            _ => {}
        }
    }

    /// Battery-backed RAM bytes followed by a little-endian 4-byte reference
    /// timestamp, per the save-file contract. Returns `None` for cartridges
    /// with no battery.
    pub fn save_ram(&self, has_battery: bool) -> Option<Vec<u8>> {
        if !has_battery {
            return None;
        }
        let mut out = self.ram.clone();
        out.extend_from_slice(&(self.rtc.reference_timestamp() as u32).to_le_bytes());
        Some(out)
    }

    /// Loads a save blob produced by `save_ram`. A save whose length does
    /// not match `ram bytes + 4` is ignored and RAM stays zeroed.
    pub fn load_ram(&mut self, data: &[u8]) {
        let expected = self.ram.len() + 4;
        if data.len() != expected {
            log::warn!(
                "ignoring save data of {} bytes, expected {}",
                data.len(),
                expected
            );
            return;
        }
        self.ram.copy_from_slice(&data[..self.ram.len()]);
        let ts_bytes: [u8; 4] = data[self.ram.len()..].try_into().unwrap();
        self.rtc.set_reference_timestamp(u32::from_le_bytes(ts_bytes) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Mbc3Variant;
    use crate::rtc::TimeSource;

    #[derive(Debug)]
    struct FixedTime(u64);

    impl TimeSource for FixedTime {
        fn now_unix_secs(&self) -> u64 {
            self.0
        }
    }

    fn header(variant: Mbc3Variant, rom_bank_count: usize, ram_bank_count: usize) -> CartridgeHeader {
        CartridgeHeader {
            title: "TEST".to_string(),
            is_cgb: false,
            variant,
            rom_bank_count,
            ram_bank_count,
        }
    }

    fn mbc3_with(rom_bank_count: usize, ram_bank_count: usize) -> Mbc3 {
        let rom = vec![0u8; rom_bank_count * ROM_BANK_SIZE];
        let header = header(
            Mbc3Variant { has_ram: true, has_battery: true, has_timer: true },
            rom_bank_count,
            ram_bank_count,
        );
        Mbc3::new(rom, &header, Box::new(FixedTime(1_000_000)))
    }

    #[test]
    fn rom_bank_select_masks_to_7_bits_and_zero_maps_to_one() {
        let mut mbc = mbc3_with(8, 1);
        mbc.write_control(0x2000, 0x00);
        assert_eq!(mbc.effective_rom_bank(), 1);

        mbc.write_control(0x2000, 0x85); // masked to 0x05
        assert_eq!(mbc.effective_rom_bank(), 5);
    }

    #[test]
    fn ram_is_gated_by_the_enable_latch() {
        let mut mbc = mbc3_with(2, 1);
        mbc.write_ext(0xA000, 0x42);
        assert_eq!(mbc.read_ext(0xA000), 0xFF, "RAM writes before enable are dropped");

        mbc.write_control(0x0000, 0x0A);
        mbc.write_ext(0xA000, 0x42);
        assert_eq!(mbc.read_ext(0xA000), 0x42);

        mbc.write_control(0x0000, 0x00);
        assert_eq!(mbc.read_ext(0xA000), 0xFF, "disabling RAM hides its contents");
    }

    #[test]
    fn rtc_seconds_write_then_read_round_trips() {
        let mut mbc = mbc3_with(2, 1);
        mbc.write_control(0x0000, 0x0A); // enable
        mbc.write_control(0x4000, 0x08); // select RTC seconds register
        mbc.write_ext(0xA000, 37);
        assert_eq!(mbc.read_ext(0xA000), 37);
    }

    #[test]
    fn save_ram_round_trips_through_load_ram() {
        let mut mbc = mbc3_with(2, 1);
        mbc.write_control(0x0000, 0x0A);
        mbc.write_ext(0xA000, 0xAB);
        mbc.write_ext(0xA001, 0xCD);

        let saved = mbc.save_ram(true).expect("battery-backed cartridge saves");

        let mut restored = mbc3_with(2, 1);
        restored.load_ram(&saved);
        restored.write_control(0x0000, 0x0A);
        assert_eq!(restored.read_ext(0xA000), 0xAB);
        assert_eq!(restored.read_ext(0xA001), 0xCD);
    }

    #[test]
    fn malformed_save_blob_is_ignored() {
        let mut mbc = mbc3_with(2, 1);
        mbc.load_ram(&[0u8; 3]); // wrong length
        mbc.write_control(0x0000, 0x0A);
        assert_eq!(mbc.read_ext(0xA000), 0, "RAM stays zeroed, not corrupted");
    }
}
