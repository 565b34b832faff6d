//! Assembler and simulator for the acc32 educational computer: a 32-bit
//! accumulator machine with byte-addressed memory, a ten-word interrupt
//! prologue and port-mapped I/O.
//!
//! The two halves talk only through the JSON image format: [`translate`]
//! turns assembly source into an [`image::Image`], [`run`] executes one
//! against an input schedule and a tick budget.

pub mod compiler;
pub mod constants;
pub mod image;
pub mod isa;
pub mod parser;
pub mod runtime;

pub use self::{compiler::translate, runtime::run};
