use parse_display::Display;

use crate::constants::Address;

use super::memory::MemoryError;

/// A condition the machine cannot run past. The run stops immediately and
/// the kind is reported to the driver as `fatal:<kind>`.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[display(style = "snake_case")]
pub enum Fatal {
    DivByZero,
    MemoryOutOfRange,
    MisalignedAccess,
    InvalidOpcode,
    PortUnderflow,
    IsrMismatch,
}

impl From<MemoryError> for Fatal {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::OutOfRange(_) => Fatal::MemoryOutOfRange,
            MemoryError::Misaligned(_) => Fatal::MisalignedAccess,
        }
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The program executed `hlt`
    Halt,

    /// The tick budget ran out before the program ended
    TicksExhausted,

    /// A fatal condition, with the offending instruction's address and
    /// source line when the image knows it
    Fatal {
        kind: Fatal,
        pc: Address,
        line: Option<u32>,
    },
}

impl Termination {
    pub fn is_halt(&self) -> bool {
        matches!(self, Termination::Halt)
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Halt => write!(f, "halt"),
            Termination::TicksExhausted => write!(f, "ticks_exhausted"),
            Termination::Fatal { kind, .. } => write!(f, "fatal:{}", kind),
        }
    }
}
