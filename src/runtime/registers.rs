use bitflags::bitflags;

use crate::constants::{Address, Word};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const ZERO             = 0b0001;
        const NEGATIVE         = 0b0010;
        const INTERRUPT_ENABLE = 0b0100;
        const IN_ISR           = 0b1000;
    }
}

impl Default for Flags {
    fn default() -> Self {
        // Interrupts start disabled
        Flags::empty()
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06b}", self.bits())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registers {
    /// Accumulator
    pub ac: Word,

    /// Program counter, a byte address
    pub pc: Address,

    /// Address register, set by the last operand resolution
    pub ar: Address,

    /// Data register, set by the last operand fetch
    pub dr: Word,

    /// Z, N, IE and the in-service bit
    pub flags: Flags,
}

impl Registers {
    /// Set Z and N from a result, as every flag-updating instruction does
    pub(crate) fn set_zn(&mut self, result: Word) {
        self.flags.set(Flags::ZERO, result == 0);
        self.flags.set(Flags::NEGATIVE, result < 0);
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ac = {} | pc = {} | ar = {} | dr = {} | flags = {:?}",
            self.ac, self.pc, self.ar, self.dr, self.flags
        )
    }
}
