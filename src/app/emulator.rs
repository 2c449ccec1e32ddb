use super::constants;
use pocketcore::gameboy::GameBoy;
use std::fs;
use std::path::Path;

/// Thin wrapper around [`GameBoy`] that adds the demo binary's own
/// play/single-step toggle; the core facade has no notion of stepping mode.
pub struct Emulator {
    pub gameboy: GameBoy,
    pub stepping: bool,
}

impl Emulator {
    pub fn new(rom_path: &Path, skip_boot_rom: bool) -> Result<Self, String> {
        println!("Loading ROM: {}", rom_path.display());
        let rom_data = fs::read(rom_path)
            .map_err(|e| format!("Failed to read ROM '{}': {}", rom_path.display(), e))?;
        let rom_size = rom_data.len();

        let mut gameboy = GameBoy::new(skip_boot_rom);
        gameboy
            .load_cartridge(&rom_data, None)
            .map_err(|e| e.to_string())?;
        println!("ROM loaded successfully ({} bytes)", rom_size);

        Ok(Emulator {
            gameboy,
            stepping: false,
        })
    }

    pub fn toggle_stepping(&mut self) {
        self.stepping = !self.stepping;
        println!("Stepping mode: {}", if self.stepping { "ON" } else { "OFF" });
    }

    /// Executes a single CPU instruction, for use while `stepping` is set.
    pub fn step_instruction(&mut self) -> Result<(), String> {
        self.gameboy.step(1).map(|_| ()).map_err(|e| e.to_string())
    }

    /// Runs approximately one frame's worth of CPU instructions.
    pub fn run_frame(&mut self) -> Result<(), String> {
        let mut cycles_this_frame: u32 = 0;
        while cycles_this_frame < constants::CYCLES_PER_FRAME {
            cycles_this_frame += self.gameboy.step(1).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}
