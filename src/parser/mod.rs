//! Program parsing logic
//!
//! Turns source text into a [`Program`]: the `.data` terms and the `.text`
//! terms, with raw label references left for the compiler to resolve. The
//! grammar is line oriented and handled by the `nom` parsers in the
//! submodules; this module walks the lines, tracks the current section and
//! reports the first error with its 1-based source line.

use nom::bytes::complete::take_while1;
use nom::combinator::verify;
use nom::IResult;
use thiserror::Error;

use crate::constants::{Address, Word};
use crate::isa::{Opcode, OperandClass};

use self::line::{DataLine, LineKind, RawOperand, RawTarget, RawValue, Section, TextLine};

pub(crate) mod line;
pub(crate) mod literal;

fn is_identifier_char(c: char) -> bool {
    is_start_identifier_char(c) || c.is_ascii_digit()
}

fn is_start_identifier_char(c: char) -> bool {
    c == '_' || c.is_ascii_lowercase() || c.is_ascii_uppercase()
}

/// Parse a C-like identifier
pub(crate) fn parse_identifier(input: &str) -> IResult<&str, &str> {
    verify(take_while1(is_identifier_char), |f: &str| {
        f.chars()
            .next()
            .filter(|&c| is_start_identifier_char(c))
            .is_some()
    })(input)
}

/// A parsed program: data terms and text terms in source order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub data: Vec<DataTerm>,
    pub text: Vec<TextTerm>,
}

/// One `.data` definition: a size header and the value words
#[derive(Clone, Debug, PartialEq)]
pub struct DataTerm {
    pub label: String,
    pub size: u32,
    pub values: Vec<DataValue>,
    pub line: u32,
}

impl DataTerm {
    /// Words emitted after the size header: the declared size when no
    /// values are given, otherwise one word per value.
    pub(crate) fn value_words(&self) -> u64 {
        if self.values.is_empty() {
            u64::from(self.size)
        } else {
            self.values
                .iter()
                .map(|value| match value {
                    DataValue::Word(_) | DataValue::Ref(_) => 1,
                    DataValue::Str(s) => s.chars().count() as u64,
                })
                .sum()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Word(Word),
    Str(String),
    /// A label reference, resolved to its byte address by the linker
    Ref(String),
}

/// One `.text` instruction with its label definitions
#[derive(Clone, Debug, PartialEq)]
pub struct TextTerm {
    pub labels: Vec<String>,
    pub opcode: Opcode,
    pub operand: Option<Operand>,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// An immediate value
    Value(Word),
    /// The address of a label
    Direct(String),
    /// One dereference, `*x`
    Deref(Target),
    /// Two dereferences, `**x`
    Deref2(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Label(String),
    Address(Address),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: syntax error")]
    Syntax { line: u32 },

    #[error("line {line}: expected a section header before this")]
    ExpectedSection { line: u32 },

    #[error("line {line}: section `{name}` is misplaced or duplicated")]
    MisplacedSection { name: &'static str, line: u32 },

    #[error("section .text is missing")]
    MissingTextSection,

    #[error("line {line}: unknown opcode `{name}`")]
    UnknownOpcode { name: String, line: u32 },

    #[error("line {line}: `{opcode}` takes no operand")]
    UnexpectedOperand { opcode: Opcode, line: u32 },

    #[error("line {line}: `{opcode}` requires an operand")]
    MissingOperand { opcode: Opcode, line: u32 },

    #[error("line {line}: operand form is not allowed for `{opcode}`")]
    BadOperand { opcode: Opcode, line: u32 },

    #[error("line {line}: port numbers are 0..=255")]
    PortOutOfRange { line: u32 },

    #[error("line {line}: interrupt vectors are 1..=8")]
    VectorOutOfRange { line: u32 },

    #[error("line {line}: number does not fit a machine word")]
    NumberOutOfRange { line: u32 },

    #[error("line {line}: data definitions need a label")]
    UnlabeledData { line: u32 },

    #[error("line {line}: data size must be a positive integer")]
    BadDataSize { line: u32 },

    #[error("line {line}: {found} value words do not match the declared size {declared}")]
    SizeMismatch { declared: u32, found: u64, line: u32 },

    #[error("line {line}: `{name}` is an instruction name, not a label")]
    ReservedLabel { name: String, line: u32 },

    #[error("line {line}: label is not attached to anything")]
    DanglingLabel { line: u32 },

    #[error("line {line}: data definition in the `.text` section")]
    DataInText { line: u32 },

    #[error("line {line}: instruction in the `.data` section")]
    InstructionInData { line: u32 },
}

fn lookup_opcode(name: &str) -> Option<Opcode> {
    // `iret` is the historical spelling of `fi`
    if name == "iret" {
        return Some(Opcode::Fi);
    }
    name.parse().ok()
}

fn check_label(name: &str, line: u32) -> Result<(), ParseError> {
    if lookup_opcode(name).is_some() {
        return Err(ParseError::ReservedLabel { name: name.into(), line });
    }
    Ok(())
}

fn word(value: i64, line: u32) -> Result<Word, ParseError> {
    Word::try_from(value).map_err(|_| ParseError::NumberOutOfRange { line })
}

fn target(raw: RawTarget, line: u32) -> Result<Target, ParseError> {
    match raw {
        RawTarget::Label(name) => Ok(Target::Label(name)),
        RawTarget::Address(addr) => Address::try_from(addr)
            .map(Target::Address)
            .map_err(|_| ParseError::NumberOutOfRange { line }),
    }
}

fn convert_operand(
    opcode: Opcode,
    raw: Option<RawOperand>,
    line: u32,
) -> Result<Option<Operand>, ParseError> {
    let class = opcode.operand_class();
    let raw = match raw {
        None if class == OperandClass::None => return Ok(None),
        None => return Err(ParseError::MissingOperand { opcode, line }),
        Some(_) if class == OperandClass::None => {
            return Err(ParseError::UnexpectedOperand { opcode, line })
        }
        Some(raw) => raw,
    };

    let operand = match (class, raw) {
        (OperandClass::Any, RawOperand::Number(v)) => Operand::Value(word(v, line)?),
        (OperandClass::Any, RawOperand::Name(name)) => Operand::Direct(name),
        (OperandClass::Any, RawOperand::Deref(t)) => Operand::Deref(target(t, line)?),
        (OperandClass::Any, RawOperand::Deref2(name)) => Operand::Deref2(name),

        (OperandClass::Store, RawOperand::Name(name)) => Operand::Direct(name),
        (OperandClass::Store, RawOperand::Deref(t)) => Operand::Deref(target(t, line)?),

        (OperandClass::Jump, RawOperand::Name(name)) => Operand::Direct(name),

        (OperandClass::Port, RawOperand::Number(v)) => {
            if !(0..=255).contains(&v) {
                return Err(ParseError::PortOutOfRange { line });
            }
            Operand::Value(v as Word)
        }

        (OperandClass::Vector, RawOperand::Number(v)) => {
            if !(1..=8).contains(&v) {
                return Err(ParseError::VectorOutOfRange { line });
            }
            Operand::Value(v as Word)
        }

        (_, _) => return Err(ParseError::BadOperand { opcode, line }),
    };
    Ok(Some(operand))
}

fn data_term(raw: DataLine, line: u32) -> Result<DataTerm, ParseError> {
    let DataLine { mut labels, size, values } = raw;
    if labels.is_empty() {
        return Err(ParseError::UnlabeledData { line });
    }
    if labels.len() > 1 {
        return Err(ParseError::Syntax { line });
    }
    let label = labels.remove(0);
    check_label(&label, line)?;

    if size <= 0 {
        return Err(ParseError::BadDataSize { line });
    }
    let size = u32::try_from(size).map_err(|_| ParseError::BadDataSize { line })?;

    let values = values
        .into_iter()
        .map(|value| match value {
            RawValue::Int(v) => word(v, line).map(DataValue::Word),
            RawValue::Str(s) => Ok(DataValue::Str(s)),
            RawValue::Ref(name) => Ok(DataValue::Ref(name)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let term = DataTerm { label, size, values, line };
    if !term.values.is_empty() && term.value_words() != u64::from(size) {
        return Err(ParseError::SizeMismatch {
            declared: size,
            found: term.value_words(),
            line,
        });
    }
    Ok(term)
}

fn text_term(raw: TextLine, line: u32) -> Result<TextTerm, ParseError> {
    for label in &raw.labels {
        check_label(label, line)?;
    }
    let opcode = lookup_opcode(&raw.mnemonic).ok_or_else(|| ParseError::UnknownOpcode {
        name: raw.mnemonic.clone(),
        line,
    })?;
    let operand = convert_operand(opcode, raw.operand, line)?;
    Ok(TextTerm { labels: raw.labels, opcode, operand, line })
}

/// Parse a whole program, reporting the first error encountered.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut section = None;
    let mut seen_data = false;
    let mut seen_text = false;
    let mut pending: Vec<String> = Vec::new();
    let mut pending_line = 0;
    let mut program = Program::default();

    for (index, raw) in source.lines().enumerate() {
        let line = index as u32 + 1;
        let kind = match line::parse_line(raw) {
            Ok((_, kind)) => kind,
            Err(_) => return Err(ParseError::Syntax { line }),
        };

        match kind {
            LineKind::Blank => {}

            LineKind::Section(name) => {
                if !pending.is_empty() {
                    return Err(ParseError::DanglingLabel { line: pending_line });
                }
                match name {
                    Section::Data if seen_data || seen_text => {
                        return Err(ParseError::MisplacedSection { name: ".data", line })
                    }
                    Section::Text if seen_text => {
                        return Err(ParseError::MisplacedSection { name: ".text", line })
                    }
                    Section::Data => seen_data = true,
                    Section::Text => seen_text = true,
                }
                section = Some(name);
            }

            LineKind::Data(data) => match section {
                None => return Err(ParseError::ExpectedSection { line }),
                Some(Section::Text) => return Err(ParseError::DataInText { line }),
                Some(Section::Data) => program.data.push(data_term(data, line)?),
            },

            LineKind::Text(text) => match section {
                None => return Err(ParseError::ExpectedSection { line }),
                Some(Section::Data) => return Err(ParseError::InstructionInData { line }),
                Some(Section::Text) => {
                    let mut term = text_term(text, line)?;
                    if !pending.is_empty() {
                        pending.append(&mut term.labels);
                        term.labels = std::mem::take(&mut pending);
                    }
                    program.text.push(term);
                }
            },

            LineKind::Labels(labels) => match section {
                None => return Err(ParseError::ExpectedSection { line }),
                // Data labels live on the definition line itself
                Some(Section::Data) => return Err(ParseError::Syntax { line }),
                Some(Section::Text) => {
                    for label in &labels {
                        check_label(label, line)?;
                    }
                    pending.extend(labels);
                    pending_line = line;
                }
            },
        }
    }

    if !pending.is_empty() {
        return Err(ParseError::DanglingLabel { line: pending_line });
    }
    if !seen_text {
        return Err(ParseError::MissingTextSection);
    }
    Ok(program)
}
