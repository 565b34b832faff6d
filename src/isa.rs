//! Instruction set definitions
//!
//! The canonical opcode table with operand arity, addressing-mode legality
//! and tick costs, plus the one-word binary encoding used when an image is
//! loaded into memory.

use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::Word;

/// Smallest value that fits the 24-bit operand field
pub const ARG_MIN: i64 = -(1 << 23);

/// Largest value that fits the 24-bit operand field
pub const ARG_MAX: i64 = (1 << 23) - 1;

#[derive(Display, FromStr, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Ld,
    St,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Cmp,
    Inc,
    Dec,
    Asr,
    Lsl,
    Jmp,
    Jz,
    Jnz,
    Jn,
    Jp,
    Out,
    In,
    Int,
    Eni,
    Dii,
    Fi,
    Nop,
    Hlt,
}

/// What kind of operand an opcode accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandClass {
    /// No operand at all
    None,
    /// Any addressing mode
    Any,
    /// Address-producing modes only (`x` or `*x`)
    Store,
    /// A code label, resolved to a direct address
    Jump,
    /// A port number literal, 0..=255
    Port,
    /// An interrupt vector literal, 1..=8
    Vector,
}

impl Opcode {
    /// Binary opcode, bits 31..26 of an instruction word. Zero is never
    /// assigned so a zeroed or data word cannot decode as an instruction.
    pub(crate) const fn code(self) -> u8 {
        match self {
            Opcode::Ld => 1,
            Opcode::St => 2,
            Opcode::Add => 3,
            Opcode::Sub => 4,
            Opcode::Mul => 5,
            Opcode::Div => 6,
            Opcode::And => 7,
            Opcode::Or => 8,
            Opcode::Cmp => 9,
            Opcode::Inc => 10,
            Opcode::Dec => 11,
            Opcode::Asr => 12,
            Opcode::Lsl => 13,
            Opcode::Jmp => 14,
            Opcode::Jz => 15,
            Opcode::Jnz => 16,
            Opcode::Jn => 17,
            Opcode::Jp => 18,
            Opcode::Out => 19,
            Opcode::In => 20,
            Opcode::Int => 21,
            Opcode::Eni => 22,
            Opcode::Dii => 23,
            Opcode::Fi => 24,
            Opcode::Nop => 25,
            Opcode::Hlt => 26,
        }
    }

    pub(crate) const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Opcode::Ld,
            2 => Opcode::St,
            3 => Opcode::Add,
            4 => Opcode::Sub,
            5 => Opcode::Mul,
            6 => Opcode::Div,
            7 => Opcode::And,
            8 => Opcode::Or,
            9 => Opcode::Cmp,
            10 => Opcode::Inc,
            11 => Opcode::Dec,
            12 => Opcode::Asr,
            13 => Opcode::Lsl,
            14 => Opcode::Jmp,
            15 => Opcode::Jz,
            16 => Opcode::Jnz,
            17 => Opcode::Jn,
            18 => Opcode::Jp,
            19 => Opcode::Out,
            20 => Opcode::In,
            21 => Opcode::Int,
            22 => Opcode::Eni,
            23 => Opcode::Dii,
            24 => Opcode::Fi,
            25 => Opcode::Nop,
            26 => Opcode::Hlt,
            _ => return None,
        })
    }

    pub const fn operand_class(self) -> OperandClass {
        use Opcode::*;

        match self {
            Ld | Add | Sub | Mul | Div | And | Or | Cmp => OperandClass::Any,
            St => OperandClass::Store,
            Jmp | Jz | Jnz | Jn | Jp => OperandClass::Jump,
            In | Out => OperandClass::Port,
            Int => OperandClass::Vector,
            Inc | Dec | Asr | Lsl | Eni | Dii | Fi | Nop | Hlt => OperandClass::None,
        }
    }
}

impl OperandClass {
    pub(crate) const fn allows(self, mode: AddrMode) -> bool {
        match self {
            OperandClass::None => false,
            OperandClass::Any => true,
            OperandClass::Store => matches!(mode, AddrMode::Direct | AddrMode::Deref),
            OperandClass::Jump => matches!(mode, AddrMode::Direct),
            OperandClass::Port | OperandClass::Vector => matches!(mode, AddrMode::Value),
        }
    }

    pub(crate) fn arg_in_range(self, arg: i64) -> bool {
        match self {
            OperandClass::Port => (0..=255).contains(&arg),
            OperandClass::Vector => (1..=8).contains(&arg),
            _ => (ARG_MIN..=ARG_MAX).contains(&arg),
        }
    }
}

/// How an operand is interpreted at run time
#[derive(Display, FromStr, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AddrMode {
    /// The operand itself
    Value,
    /// The word at the operand address
    Direct,
    /// One indirection; for stores, the operand holds the target address
    Deref,
    /// Two indirections, both resolved at run time
    Deref2,
}

impl AddrMode {
    const fn code(self) -> u8 {
        match self {
            AddrMode::Value => 0,
            AddrMode::Direct => 1,
            AddrMode::Deref => 2,
            AddrMode::Deref2 => 3,
        }
    }

    const fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0 => AddrMode::Value,
            1 => AddrMode::Direct,
            2 => AddrMode::Deref,
            _ => AddrMode::Deref2,
        }
    }

    /// Memory words read to produce the operand value
    const fn fetch_cost(self) -> u64 {
        match self {
            AddrMode::Value => 0,
            AddrMode::Direct | AddrMode::Deref => 1,
            AddrMode::Deref2 => 2,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("word {0:#010x} does not hold a known opcode")]
    BadOpcode(u32),

    #[error("mode {mode} is not legal for `{opcode}`")]
    BadMode { opcode: Opcode, mode: AddrMode },

    #[error("operand {arg} is out of range for `{opcode}`")]
    BadArg { opcode: Opcode, arg: Word },
}

/// A decoded instruction word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instr {
    pub opcode: Opcode,
    pub mode: AddrMode,
    pub arg: Word,
}

impl Instr {
    /// Pack into one machine word: opcode in bits 31..26, mode in bits
    /// 25..24, operand as a signed 24-bit field in bits 23..0.
    pub fn encode(&self) -> u32 {
        (u32::from(self.opcode.code()) << 26)
            | (u32::from(self.mode.code()) << 24)
            | (self.arg as u32 & 0x00ff_ffff)
    }

    /// Unpack a machine word, checking mode legality and operand range
    /// against the opcode table.
    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        let opcode =
            Opcode::from_code((word >> 26) as u8).ok_or(DecodeError::BadOpcode(word))?;
        let mode = AddrMode::from_code((word >> 24) as u8);
        // Sign-extend the 24-bit operand field
        let arg = ((word << 8) as Word) >> 8;

        let class = opcode.operand_class();
        match class {
            OperandClass::None => {
                if mode != AddrMode::Value || arg != 0 {
                    return Err(DecodeError::BadMode { opcode, mode });
                }
            }
            _ => {
                if !class.allows(mode) {
                    return Err(DecodeError::BadMode { opcode, mode });
                }
                if !class.arg_in_range(arg.into()) {
                    return Err(DecodeError::BadArg { opcode, arg });
                }
            }
        }

        Ok(Instr { opcode, mode, arg })
    }

    /// Declared tick cost: one tick to execute, plus one tick per memory
    /// word the operand fetch reads and per word a store writes. `fi` pays
    /// for its two restore reads.
    pub const fn cost(&self) -> u64 {
        use Opcode::*;

        match self.opcode {
            Ld | Add | Sub | Mul | Div | And | Or | Cmp => 1 + self.mode.fetch_cost(),
            St => match self.mode {
                AddrMode::Deref => 3,
                _ => 2,
            },
            Fi => 3,
            _ => 1,
        }
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.opcode.operand_class() == OperandClass::None {
            return write!(f, "{}", self.opcode);
        }
        match self.mode {
            AddrMode::Value => write!(f, "{} {}", self.opcode, self.arg),
            AddrMode::Direct => write!(f, "{} [{}]", self.opcode, self.arg),
            AddrMode::Deref => write!(f, "{} *[{}]", self.opcode, self.arg),
            AddrMode::Deref2 => write!(f, "{} **[{}]", self.opcode, self.arg),
        }
    }
}
