/// Byte address in the machine memory
pub type Address = u32;

/// Machine word: 32-bit signed two's complement, little-endian in memory
pub type Word = i32;

/// Size of a machine word in bytes
pub const WORD_BYTES: Address = 4;

/// Number of interrupt vector slots in the prologue
pub const VECTOR_COUNT: usize = 8;

/// Number of words reserved at the start of every image (8 vectors + 2 save)
pub const PROLOGUE_WORDS: usize = 10;

/// Address where AC is saved when an interrupt is accepted
pub const AC_SAVE: Address = 32;

/// Address where PC is saved when an interrupt is accepted
pub const PC_SAVE: Address = 36;

/// Byte address of the `_start` instruction, right after the prologue
pub const PROGRAM_START: Address = 40;

/// Largest image the layout pass accepts, in bytes
pub const MAX_IMAGE_BYTES: u64 = 65536;

/// Scratch memory appended after the loaded image
pub const DATA_REGION_BYTES: usize = 4096;
