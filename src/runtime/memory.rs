use thiserror::Error;

use crate::constants::{Address, Word, WORD_BYTES};

/// Represents errors raised by memory accesses
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {0} is out of range")]
    OutOfRange(Address),

    #[error("misaligned word access at address {0}")]
    Misaligned(Address),
}

/// Byte-addressed memory with a little-endian 32-bit word view.
///
/// Word accesses must be 4-byte aligned; anything else is an error the
/// control unit turns into a fatal stop.
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub(crate) fn new(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    /// Wrap an already-filled byte buffer, as the image loader builds one
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn word_slice(&self, address: Address) -> Result<&[u8], MemoryError> {
        if address % WORD_BYTES != 0 {
            return Err(MemoryError::Misaligned(address));
        }
        self.bytes
            .get(address as usize..address as usize + WORD_BYTES as usize)
            .ok_or(MemoryError::OutOfRange(address))
    }

    /// Read the word at an aligned byte address
    pub fn load(&self, address: Address) -> Result<Word, MemoryError> {
        let slice = self.word_slice(address)?;
        let mut bytes = [0; WORD_BYTES as usize];
        bytes.copy_from_slice(slice);
        Ok(Word::from_le_bytes(bytes))
    }

    /// Read the word at an aligned byte address, uninterpreted
    pub(crate) fn load_raw(&self, address: Address) -> Result<u32, MemoryError> {
        self.load(address).map(|word| word as u32)
    }

    /// Write a word to an aligned byte address
    pub(crate) fn store(&mut self, address: Address, value: Word) -> Result<(), MemoryError> {
        if address % WORD_BYTES != 0 {
            return Err(MemoryError::Misaligned(address));
        }
        let slice = self
            .bytes
            .get_mut(address as usize..address as usize + WORD_BYTES as usize)
            .ok_or(MemoryError::OutOfRange(address))?;
        slice.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn words_are_little_endian() {
        let mut memory = Memory::new(16);
        memory.store(4, 0x0102_0304).unwrap();
        assert_eq!(memory.load(4), Ok(0x0102_0304));
        // Low byte first
        assert_eq!(memory.bytes[4..8], [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn negative_words_roundtrip() {
        let mut memory = Memory::new(8);
        memory.store(0, -1).unwrap();
        assert_eq!(memory.load(0), Ok(-1));
    }

    #[test]
    fn rejects_misaligned_access() {
        let mut memory = Memory::new(16);
        assert_eq!(memory.load(2), Err(MemoryError::Misaligned(2)));
        assert_eq!(memory.store(7, 1), Err(MemoryError::Misaligned(7)));
    }

    #[test]
    fn rejects_out_of_range_access() {
        let mut memory = Memory::new(8);
        assert_eq!(memory.load(8), Err(MemoryError::OutOfRange(8)));
        assert_eq!(memory.store(12, 1), Err(MemoryError::OutOfRange(12)));
    }
}
