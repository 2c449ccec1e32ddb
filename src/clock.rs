//! CGB double-speed switching and cycle fan-out.
//!
//! The CPU always reports T-cycles at whatever rate it's currently running.
//! The PPU renders at the fixed, real hardware dot rate regardless of speed
//! mode, so in double-speed mode its cycle count is half the CPU's. DIV and
//! the timer increment at CPU rate in both modes (hardware doubles their
//! tick rate right along with the CPU so their real-world frequency stays
//! constant), so they get the raw cycle count unchanged. The APU runs at
//! the fixed rate like the PPU; a half-cycle accumulator absorbs any odd
//! remainder rather than dropping it.

pub const KEY1_UNUSED_BITS: u8 = 0x7E;
const STOP_SPEED_SWITCH_STALL_CYCLES: u32 = 130_996;

/// Per-step cycle counts handed to the components that don't speed up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickedCycles {
    pub ppu_cycles: u32,
    pub timer_cycles: u32,
    pub apu_cycles: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Clock {
    double_speed: bool,
    switch_armed: bool,
    stall_remaining: u32,
    apu_residue_half_cycles: u32,
}

impl Clock {
    pub fn new() -> Self {
        Clock::default()
    }

    pub fn is_double_speed(&self) -> bool {
        self.double_speed
    }

    pub fn read_key1(&self) -> u8 {
        let mut value = KEY1_UNUSED_BITS;
        if self.double_speed {
            value |= 0x80;
        }
        if self.switch_armed {
            value |= 0x01;
        }
        value
    }

    pub fn write_key1(&mut self, value: u8) {
        self.switch_armed = value & 0x01 != 0;
    }

    /// Called when the CPU executes STOP. Returns `true` if a speed switch
    /// was armed (and therefore performed), which stalls the CPU for
    /// `STOP_SPEED_SWITCH_STALL_CYCLES` T-cycles.
    pub fn notify_stop(&mut self) -> bool {
        if self.switch_armed {
            self.double_speed = !self.double_speed;
            self.switch_armed = false;
            self.stall_remaining = STOP_SPEED_SWITCH_STALL_CYCLES;
            true
        } else {
            false
        }
    }

    pub fn cpu_is_stalled(&self) -> bool {
        self.stall_remaining > 0
    }

    /// Consumes up to `cycles` from the pending speed-switch stall, returning
    /// how much was actually absorbed.
    pub fn drain_stall(&mut self, cycles: u32) -> u32 {
        let consumed = cycles.min(self.stall_remaining);
        self.stall_remaining -= consumed;
        consumed
    }

    /// Converts CPU T-cycles just executed into the cycle counts the other
    /// bus-owned components should advance by this step.
    pub fn convert(&mut self, cpu_t_cycles: u32) -> TickedCycles {
        if !self.double_speed {
            return TickedCycles {
                ppu_cycles: cpu_t_cycles,
                timer_cycles: cpu_t_cycles,
                apu_cycles: cpu_t_cycles,
            };
        }

        let halved = cpu_t_cycles / 2;
        let remainder = cpu_t_cycles % 2;

        self.apu_residue_half_cycles += remainder;
        let mut apu_cycles = halved;
        if self.apu_residue_half_cycles >= 2 {
            apu_cycles += 1;
            self.apu_residue_half_cycles -= 2;
        }

        TickedCycles {
            ppu_cycles: halved,
            timer_cycles: cpu_t_cycles,
            apu_cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key1_reads_unused_bits_set() {
        let clock = Clock::new();
        assert_eq!(clock.read_key1(), KEY1_UNUSED_BITS);
    }

    #[test]
    fn notify_stop_without_arming_does_nothing() {
        let mut clock = Clock::new();
        assert!(!clock.notify_stop());
        assert!(!clock.is_double_speed());
    }

    #[test]
    fn notify_stop_armed_toggles_speed_and_stalls() {
        let mut clock = Clock::new();
        clock.write_key1(0x01);
        assert!(clock.notify_stop());
        assert!(clock.is_double_speed());
        assert!(clock.cpu_is_stalled());
    }

    #[test]
    fn double_speed_halves_ppu_and_apu_but_not_timer() {
        let mut clock = Clock::new();
        clock.write_key1(0x01);
        clock.notify_stop();
        let ticked = clock.convert(16);
        assert_eq!(ticked.ppu_cycles, 8);
        assert_eq!(ticked.timer_cycles, 16);
        assert_eq!(ticked.apu_cycles, 8);
    }
}
