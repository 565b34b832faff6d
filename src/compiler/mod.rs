//! Two-pass assembler back end
//!
//! Pass 1 ([`layout`]) assigns a byte address to every term and binds
//! labels; pass 2 ([`link`]) resolves operands against those addresses and
//! emits the image records.

use thiserror::Error;
use tracing::debug;

use crate::image::Image;
use crate::parser::{self, ParseError, Program};

mod layout;
mod link;

pub use self::layout::LayoutError;
pub use self::link::LinkError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Compile a parsed program into a machine-code image.
#[tracing::instrument(skip(program))]
pub fn compile(program: &Program) -> Result<Image, CompileError> {
    let layout = self::layout::layout(program)?;
    let image = self::link::link(program, &layout)?;
    debug!(words = image.word_count(), "image assembled");
    Ok(image)
}

/// Translate assembly source into a machine-code image.
///
/// This is the whole assembler: parse, lay out, link. Same source, same
/// image; there is no other state.
#[tracing::instrument(skip(source))]
pub fn translate(source: &str) -> Result<Image, TranslateError> {
    let program = parser::parse(source)?;
    Ok(compile(&program)?)
}
