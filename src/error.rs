//! Error and diagnostic routing for the emulator core.
//!
//! Non-fatal diagnostics go through the `log` facade; anything the core
//! cannot recover from is routed to a host-supplied [`BreakSink`] and also
//! surfaced as an [`EmuError`] from whichever facade call triggered it.

use std::fmt;

#[derive(Debug, Clone)]
pub enum EmuError {
    InvalidOpcode { opcode: u8, pc: u16 },
    BadAddressingMode { pc: u16, detail: String },
    UnmappedAccess { addr: u16 },
    MalformedCartridge(String),
}

impl fmt::Display for EmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmuError::InvalidOpcode { opcode, pc } => {
                write!(f, "invalid opcode {opcode:#04X} at PC={pc:#06X}")
            }
            EmuError::BadAddressingMode { pc, detail } => {
                write!(f, "bad addressing mode at PC={pc:#06X}: {detail}")
            }
            EmuError::UnmappedAccess { addr } => {
                write!(f, "unmapped bus access at {addr:#06X}")
            }
            EmuError::MalformedCartridge(detail) => {
                write!(f, "malformed cartridge: {detail}")
            }
        }
    }
}

impl std::error::Error for EmuError {}

/// Fatal-diagnostic sink the host installs. The default implementation
/// drops everything; a host wanting to surface breaks to a debugger or UI
/// overrides `on_break`.
pub trait BreakSink {
    fn on_break(&mut self, error: &EmuError);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullBreakSink;

impl BreakSink for NullBreakSink {
    fn on_break(&mut self, _error: &EmuError) {}
}

/// Logs every break at error level via the `log` facade, in addition to
/// whatever the host's own sink does.
pub(crate) fn log_break(error: &EmuError) {
    log::error!("{error}");
}
