//! Pass 1: address assignment
//!
//! Walks the emission order (prologue, the `_start` block through the end of
//! `.text`, then the instructions that preceded `_start`, then all data),
//! binds every label to its byte address and fills the interrupt vector
//! slots from the `int1`..`int8` handler labels.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::constants as C;
use crate::isa::Opcode;
use crate::parser::{Operand, Program, TextTerm};

pub(crate) type Labels<'a> = HashMap<&'a str, u64>;

#[derive(Debug)]
pub(crate) struct Layout<'a> {
    /// Label name to byte address
    pub labels: Labels<'a>,

    /// Instructions in emission order
    pub order: Vec<&'a TextTerm>,

    /// Vector slot contents; 0 means unbound
    pub vectors: [u64; C::VECTOR_COUNT],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("label `_start` is not defined")]
    MissingStart,

    #[error("line {line}: duplicate label `{label}`")]
    DuplicateLabel { label: String, line: u32 },

    #[error("image would take {bytes} bytes, over the {} byte limit", C::MAX_IMAGE_BYTES)]
    ImageTooLarge { bytes: u64 },

    #[error("line {line}: `int {vector}` has no `int{vector}` handler")]
    UnboundVector { vector: u8, line: u32 },
}

fn insert_label<'a>(
    labels: &mut Labels<'a>,
    label: &'a str,
    address: u64,
    line: u32,
) -> Result<(), LayoutError> {
    if labels.contains_key(label) {
        return Err(LayoutError::DuplicateLabel { label: label.into(), line });
    }
    debug!(label, address, "placing label");
    labels.insert(label, address);
    Ok(())
}

#[tracing::instrument(skip(program))]
pub(crate) fn layout(program: &Program) -> Result<Layout<'_>, LayoutError> {
    let start = program
        .text
        .iter()
        .position(|term| term.labels.iter().any(|l| l == "_start"))
        .ok_or(LayoutError::MissingStart)?;

    // Everything from `_start` on comes first; code written above it in the
    // source is appended after.
    let order: Vec<&TextTerm> = program.text[start..]
        .iter()
        .chain(program.text[..start].iter())
        .collect();

    let mut labels = Labels::new();
    let mut position = u64::from(C::PROGRAM_START);

    for term in &order {
        for label in &term.labels {
            insert_label(&mut labels, label, position, term.line)?;
        }
        position += u64::from(C::WORD_BYTES);
    }

    for term in &program.data {
        // The size header word sits right before the labeled value words
        position += u64::from(C::WORD_BYTES);
        insert_label(&mut labels, &term.label, position, term.line)?;
        position += u64::from(C::WORD_BYTES) * term.value_words();
    }

    if position > C::MAX_IMAGE_BYTES {
        return Err(LayoutError::ImageTooLarge { bytes: position });
    }

    let mut vectors = [0; C::VECTOR_COUNT];
    for (slot, vector) in vectors.iter_mut().enumerate() {
        let name = format!("int{}", slot + 1);
        if let Some(&address) = labels.get(name.as_str()) {
            debug!(name = name.as_str(), address, "binding vector slot");
            *vector = address;
        }
    }

    for term in &program.text {
        if term.opcode == Opcode::Int {
            if let Some(Operand::Value(n)) = term.operand {
                if vectors[n as usize - 1] == 0 {
                    return Err(LayoutError::UnboundVector {
                        vector: n as u8,
                        line: term.line,
                    });
                }
            }
        }
    }

    Ok(Layout { labels, order, vectors })
}
