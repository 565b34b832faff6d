//! The machine-code image
//!
//! An image is an ordered list of word records; the position of a record in
//! the list is its word address. The first ten records form the prologue
//! (eight interrupt vector slots and the two AC/PC save words) and the
//! `_start` instruction sits at index 10. The textual form is JSON, one
//! object per record, and is the only thing the assembler and the simulator
//! exchange.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{Word, PROLOGUE_WORDS};
use crate::isa::{AddrMode, Opcode};

/// One memory word of the image
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum Record {
    Instruction {
        index: usize,
        opcode: Opcode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<Word>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<AddrMode>,
        line: u32,
    },
    Data {
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        value: Word,
        line: u32,
    },
}

impl Record {
    pub fn index(&self) -> usize {
        match self {
            Record::Instruction { index, .. } | Record::Data { index, .. } => *index,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            Record::Instruction { line, .. } | Record::Data { line, .. } => *line,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("malformed image: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record {found} is numbered {expected}")]
    BadIndex { expected: usize, found: usize },

    #[error("image has {0} records, shorter than the prologue")]
    TruncatedPrologue(usize),

    #[error("prologue record {0} is not a data word")]
    CodeInPrologue(usize),

    #[error("no instruction at the entry index {}", PROLOGUE_WORDS)]
    MissingEntry,
}

/// An ordered list of records; serializes as a bare JSON array
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct Image {
    pub records: Vec<Record>,
}

impl Image {
    /// Number of memory words the image occupies
    pub fn word_count(&self) -> usize {
        self.records.len()
    }

    pub fn to_json(&self) -> Result<String, ImageError> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Parse and validate the textual form. Inverse of [`Image::to_json`]
    /// on every valid image.
    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let image: Image = serde_json::from_str(text)?;
        image.validate()?;
        Ok(image)
    }

    fn validate(&self) -> Result<(), ImageError> {
        for (expected, record) in self.records.iter().enumerate() {
            if record.index() != expected {
                return Err(ImageError::BadIndex { expected, found: record.index() });
            }
        }
        if self.records.len() <= PROLOGUE_WORDS {
            return Err(ImageError::TruncatedPrologue(self.records.len()));
        }
        for (index, record) in self.records.iter().take(PROLOGUE_WORDS).enumerate() {
            if matches!(record, Record::Instruction { .. }) {
                return Err(ImageError::CodeInPrologue(index));
            }
        }
        if !matches!(self.records[PROLOGUE_WORDS], Record::Instruction { .. }) {
            return Err(ImageError::MissingEntry);
        }
        Ok(())
    }
}
