//! MBC3 real-time clock registers.
//!
//! The running clock is derived on demand from a reference Unix timestamp
//! rather than ticked cycle-by-cycle, so `update()` has nothing to do every
//! step; only reads/writes/latches touch this module.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seam for deterministic RTC testing; the default implementation reads the
/// host's wall clock.
pub trait TimeSource: fmt::Debug {
    fn now_unix_secs(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_unix_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct MaterializedTime {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    day_overflow: bool,
}

fn materialize(total_secs: u64) -> MaterializedTime {
    let mut days = total_secs / 86_400;
    let mut day_overflow = false;
    if days > 511 {
        days %= 512;
        day_overflow = true;
    }
    let remainder = total_secs % 86_400;
    MaterializedTime {
        seconds: (remainder % 60) as u8,
        minutes: ((remainder / 60) % 60) as u8,
        hours: (remainder / 3600) as u8,
        days: days as u16,
        day_overflow,
    }
}

fn total_secs_of(t: MaterializedTime) -> u64 {
    t.days as u64 * 86_400 + t.hours as u64 * 3600 + t.minutes as u64 * 60 + t.seconds as u64
}

/// Represents the Real-Time Clock registers for MBC3.
#[derive(Debug)]
pub struct RtcRegisters {
    time_source: Box<dyn TimeSource + Send>,
    reference: u64,
    halted: bool,
    halted_elapsed: u64,
    day_overflow_sticky: bool,
    latched: MaterializedTime,
    last_latch_write: u8,
}

impl Default for RtcRegisters {
    fn default() -> Self {
        Self::new(Box::new(SystemTimeSource))
    }
}

impl RtcRegisters {
    const HALT_BIT: u8 = 0b0100_0000;
    const DAY_OVERFLOW_BIT: u8 = 0b1000_0000;
    const DAY_CARRY_BIT: u8 = 0b0000_0001;

    pub fn new(time_source: Box<dyn TimeSource + Send>) -> Self {
        let reference = time_source.now_unix_secs();
        RtcRegisters {
            time_source,
            reference,
            halted: false,
            halted_elapsed: 0,
            day_overflow_sticky: false,
            latched: MaterializedTime::default(),
            last_latch_write: 0xFF,
        }
    }

    /// Anchor timestamp, serialised alongside battery-backed RAM so the
    /// clock keeps running across save/load cycles.
    pub fn reference_timestamp(&self) -> u64 {
        self.reference
    }

    pub fn set_reference_timestamp(&mut self, reference: u64) {
        self.reference = reference;
    }

    fn elapsed_secs(&self) -> u64 {
        if self.halted {
            self.halted_elapsed
        } else {
            self.time_source
                .now_unix_secs()
                .saturating_sub(self.reference)
        }
    }

    fn live(&self) -> MaterializedTime {
        let mut t = materialize(self.elapsed_secs());
        t.day_overflow |= self.day_overflow_sticky;
        t
    }

    /// Copies the live, continuously-running clock into the latched
    /// snapshot that register reads observe.
    pub fn latch(&mut self) {
        let live = self.live();
        self.day_overflow_sticky |= live.day_overflow;
        self.latched = live;
    }

    /// Called on every write to 0x6000..0x7FFF; latches on the 0 -> 1 edge.
    pub fn handle_latch_write(&mut self, value: u8) {
        if self.last_latch_write == 0x00 && value == 0x01 {
            self.latch();
        }
        self.last_latch_write = value;
    }

    pub fn read(&self, reg_select: u8) -> u8 {
        match reg_select {
            0x08 => self.latched.seconds,
            0x09 => self.latched.minutes,
            0x0A => self.latched.hours,
            0x0B => (self.latched.days & 0xFF) as u8,
            0x0C => {
                let mut dh = (self.latched.days >> 8) as u8 & Self::DAY_CARRY_BIT;
                if self.halted {
                    dh |= Self::HALT_BIT;
                }
                if self.latched.day_overflow {
                    dh |= Self::DAY_OVERFLOW_BIT;
                }
                dh
            }
            _ => 0xFF,
        }
    }

    /// Writes a field, rematerialising the live clock so the new value
    /// takes effect immediately (not just after the next latch).
    pub fn write(&mut self, reg_select: u8, value: u8) {
        if reg_select == 0x0C {
            let was_halted = self.halted;
            let now_halted = value & Self::HALT_BIT != 0;
            if now_halted && !was_halted {
                self.halted_elapsed = self.elapsed_secs();
            } else if !now_halted && was_halted {
                self.reference = self
                    .time_source
                    .now_unix_secs()
                    .saturating_sub(self.halted_elapsed);
            }
            self.halted = now_halted;

            let mut t = self.live();
            t.days = (t.days & 0x00FF) | ((value as u16 & Self::DAY_CARRY_BIT as u16) << 8);
            self.day_overflow_sticky = self.day_overflow_sticky && value & Self::DAY_OVERFLOW_BIT != 0;
            self.rematerialize_from(t);
            return;
        }

        let mut t = self.live();
        match reg_select {
            0x08 => t.seconds = value.min(59),
            0x09 => t.minutes = value.min(59),
            0x0A => t.hours = value.min(23),
            0x0B => t.days = (t.days & 0xFF00) | value as u16,
            _ => return,
        }
        self.rematerialize_from(t);
    }

    fn rematerialize_from(&mut self, t: MaterializedTime) {
        let total = total_secs_of(t);
        if self.halted {
            self.halted_elapsed = total;
        } else {
            self.reference = self.time_source.now_unix_secs().saturating_sub(total);
        }
        self.latched = t;
    }
}
