//! Cartridge header parsing and validation.
//!
//! Only MBC3 variants are supported; anything else is rejected at load
//! time with [`EmuError::MalformedCartridge`].

use crate::error::EmuError;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_TITLE: std::ops::Range<usize> = 0x134..0x144;
const HEADER_CGB_FLAG: usize = 0x143;
const HEADER_TYPE: usize = 0x147;
const HEADER_ROM_SIZE: usize = 0x148;
const HEADER_RAM_SIZE: usize = 0x149;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mbc3Variant {
    pub has_ram: bool,
    pub has_battery: bool,
    pub has_timer: bool,
}

#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    pub title: String,
    pub is_cgb: bool,
    pub variant: Mbc3Variant,
    pub rom_bank_count: usize,
    pub ram_bank_count: usize,
}

fn variant_from_type(type_code: u8) -> Result<Mbc3Variant, EmuError> {
    match type_code {
        0x0F => Ok(Mbc3Variant { has_ram: false, has_battery: true, has_timer: true }),
        0x10 => Ok(Mbc3Variant { has_ram: true, has_battery: true, has_timer: true }),
        0x11 => Ok(Mbc3Variant { has_ram: false, has_battery: false, has_timer: false }),
        0x12 => Ok(Mbc3Variant { has_ram: true, has_battery: false, has_timer: false }),
        0x13 => Ok(Mbc3Variant { has_ram: true, has_battery: true, has_timer: false }),
        other => Err(EmuError::MalformedCartridge(format!(
            "cartridge type {other:#04X} is not a supported MBC3 variant"
        ))),
    }
}

fn rom_bank_count(rom_size_code: u8) -> Result<usize, EmuError> {
    match rom_size_code {
        0x00..=0x08 => Ok(2usize << rom_size_code),
        other => Err(EmuError::MalformedCartridge(format!(
            "unsupported ROM size code {other:#04X}"
        ))),
    }
}

fn ram_bank_count(ram_size_code: u8) -> Result<usize, EmuError> {
    match ram_size_code {
        0x00 => Ok(0),
        0x01 => Ok(0),
        0x02 => Ok(1),
        0x03 => Ok(4),
        0x04 => Ok(16),
        0x05 => Ok(8),
        other => Err(EmuError::MalformedCartridge(format!(
            "unsupported RAM size code {other:#04X}"
        ))),
    }
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, EmuError> {
        if rom.len() < 0x150 {
            return Err(EmuError::MalformedCartridge(
                "ROM image shorter than the header region".into(),
            ));
        }

        let variant = variant_from_type(rom[HEADER_TYPE])?;
        let rom_bank_count = rom_bank_count(rom[HEADER_ROM_SIZE])?;
        let ram_bank_count = ram_bank_count(rom[HEADER_RAM_SIZE])?;

        let expected_rom_len = rom_bank_count * ROM_BANK_SIZE;
        if rom.len() != expected_rom_len {
            return Err(EmuError::MalformedCartridge(format!(
                "ROM length {} does not match header-declared {} bytes ({} banks of {} bytes)",
                rom.len(),
                expected_rom_len,
                rom_bank_count,
                ROM_BANK_SIZE
            )));
        }

        let title = String::from_utf8_lossy(&rom[HEADER_TITLE])
            .trim_end_matches('\0')
            .to_string();
        let is_cgb = matches!(rom[HEADER_CGB_FLAG], 0x80 | 0xC0);

        Ok(CartridgeHeader {
            title,
            is_cgb,
            variant,
            rom_bank_count,
            ram_bank_count,
        })
    }

    pub fn ram_bytes(&self) -> usize {
        self.ram_bank_count * RAM_BANK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_header(type_code: u8, rom_size_code: u8, ram_size_code: u8, rom_banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; rom_banks * ROM_BANK_SIZE];
        rom[HEADER_TYPE] = type_code;
        rom[HEADER_ROM_SIZE] = rom_size_code;
        rom[HEADER_RAM_SIZE] = ram_size_code;
        rom
    }

    #[test]
    fn mbc3_plus_ram_plus_battery_parses_with_ram_and_no_timer() {
        let rom = rom_with_header(0x13, 0x00, 0x02, 2);
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert!(header.variant.has_ram);
        assert!(header.variant.has_battery);
        assert!(!header.variant.has_timer);
    }

    #[test]
    fn mbc3_plus_timer_plus_battery_parses_without_ram() {
        let rom = rom_with_header(0x0F, 0x00, 0x00, 2);
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert!(!header.variant.has_ram);
        assert!(header.variant.has_battery);
        assert!(header.variant.has_timer);
    }

    #[test]
    fn unsupported_cartridge_type_is_rejected() {
        let rom = rom_with_header(0x01, 0x00, 0x00, 2); // plain MBC1, not MBC3
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn rom_size_code_selects_matching_bank_count() {
        let rom = rom_with_header(0x11, 0x02, 0x00, 8); // code 2 => 8 banks of 16KiB
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.rom_bank_count, 8);
    }

    #[test]
    fn ram_size_code_0x01_is_a_valid_unused_entry_with_no_ram() {
        let rom = rom_with_header(0x11, 0x00, 0x01, 2);
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.ram_bank_count, 0);
        assert_eq!(header.ram_bytes(), 0);
    }

    #[test]
    fn ram_size_code_selects_matching_bank_count_and_byte_size() {
        let rom = rom_with_header(0x12, 0x00, 0x03, 2); // code 3 => 4 banks
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.ram_bank_count, 4);
        assert_eq!(header.ram_bytes(), 4 * RAM_BANK_SIZE);
    }

    #[test]
    fn out_of_range_ram_size_code_is_rejected() {
        let rom = rom_with_header(0x12, 0x00, 0x06, 2);
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn rom_length_mismatched_with_header_declared_size_is_rejected() {
        let mut rom = rom_with_header(0x11, 0x00, 0x00, 2); // declares 2 banks (32 KiB)
        rom.truncate(ROM_BANK_SIZE); // but only ships 1
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn rom_shorter_than_header_region_is_rejected() {
        let rom = vec![0u8; 0x100];
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn title_is_read_and_trimmed_of_trailing_nulls() {
        let mut rom = rom_with_header(0x11, 0x00, 0x00, 2);
        rom[HEADER_TITLE.start..HEADER_TITLE.start + 5].copy_from_slice(b"POKEM");
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.title, "POKEM");
    }

    #[test]
    fn cgb_flag_marks_color_cartridges() {
        let mut rom = rom_with_header(0x11, 0x00, 0x00, 2);
        rom[HEADER_CGB_FLAG] = 0xC0;
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert!(header.is_cgb);
    }
}
