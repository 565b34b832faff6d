//! Pass 2: operand resolution and record emission
//!
//! Translates every instruction operand into an `(addressing mode, value)`
//! pair using the addresses assigned by pass 1, expands data definitions
//! into words, and emits the image records in their final order.

use thiserror::Error;
use tracing::debug;

use super::layout::Layout;
use crate::constants::Word;
use crate::image::{Image, Record};
use crate::isa::{AddrMode, ARG_MAX, ARG_MIN};
use crate::parser::{DataValue, Operand, Program, Target, TextTerm};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("line {line}: label `{label}` is not defined")]
    UndefinedLabel { label: String, line: u32 },

    #[error("line {line}: operand does not fit the instruction word")]
    OperandOverflow { line: u32 },
}

fn lookup(layout: &Layout<'_>, label: &str, line: u32) -> Result<u64, LinkError> {
    layout
        .labels
        .get(label)
        .copied()
        .ok_or_else(|| LinkError::UndefinedLabel { label: label.into(), line })
}

fn resolve(
    term: &TextTerm,
    layout: &Layout<'_>,
) -> Result<(Option<AddrMode>, Option<Word>), LinkError> {
    let operand = match &term.operand {
        None => return Ok((None, None)),
        Some(operand) => operand,
    };

    let (mode, value) = match operand {
        Operand::Value(v) => (AddrMode::Value, i64::from(*v)),
        Operand::Direct(name) => (AddrMode::Direct, lookup(layout, name, term.line)? as i64),
        Operand::Deref(Target::Label(name)) => {
            (AddrMode::Deref, lookup(layout, name, term.line)? as i64)
        }
        Operand::Deref(Target::Address(addr)) => (AddrMode::Deref, i64::from(*addr)),
        Operand::Deref2(name) => (AddrMode::Deref2, lookup(layout, name, term.line)? as i64),
    };

    if !(ARG_MIN..=ARG_MAX).contains(&value) {
        return Err(LinkError::OperandOverflow { line: term.line });
    }
    Ok((Some(mode), Some(value as Word)))
}

#[tracing::instrument(skip(program, layout))]
pub(crate) fn link(program: &Program, layout: &Layout<'_>) -> Result<Image, LinkError> {
    let mut records = Vec::new();

    for &vector in &layout.vectors {
        records.push(Record::Data {
            index: records.len(),
            label: None,
            value: vector as Word,
            line: 0,
        });
    }
    // The two AC/PC save words
    for _ in 0..2 {
        records.push(Record::Data { index: records.len(), label: None, value: 0, line: 0 });
    }

    for &term in &layout.order {
        let (mode, arg) = resolve(term, layout)?;
        debug!(opcode = %term.opcode, line = term.line, "emitting instruction");
        records.push(Record::Instruction {
            index: records.len(),
            opcode: term.opcode,
            arg,
            mode,
            line: term.line,
        });
    }

    for term in &program.data {
        records.push(Record::Data {
            index: records.len(),
            label: None,
            value: term.size as Word,
            line: term.line,
        });

        // The first value word carries the label
        let mut label = Some(term.label.clone());
        let mut push = |records: &mut Vec<Record>, value: Word| {
            records.push(Record::Data {
                index: records.len(),
                label: label.take(),
                value,
                line: term.line,
            });
        };

        if term.values.is_empty() {
            for _ in 0..term.size {
                push(&mut records, 0);
            }
        } else {
            for value in &term.values {
                match value {
                    DataValue::Word(w) => push(&mut records, *w),
                    DataValue::Ref(name) => {
                        let address = lookup(layout, name, term.line)?;
                        push(&mut records, address as Word);
                    }
                    DataValue::Str(s) => {
                        for c in s.chars() {
                            push(&mut records, c as Word);
                        }
                    }
                }
            }
        }
    }

    Ok(Image { records })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::compile;
    use super::*;
    use crate::constants::PROLOGUE_WORDS;
    use crate::isa::Opcode;
    use crate::parser::parse;

    #[test]
    fn emits_prologue_and_entry() {
        let image = compile(&parse("section .text:\n_start: hlt\n").unwrap()).unwrap();
        assert_eq!(image.word_count(), PROLOGUE_WORDS + 1);
        for record in &image.records[..PROLOGUE_WORDS] {
            assert_eq!(
                *record,
                Record::Data { index: record.index(), label: None, value: 0, line: 0 }
            );
        }
        assert_eq!(
            image.records[PROLOGUE_WORDS],
            Record::Instruction {
                index: PROLOGUE_WORDS,
                opcode: Opcode::Hlt,
                arg: None,
                mode: None,
                line: 2,
            }
        );
    }

    #[test]
    fn resolves_operands() {
        let source = r#"
section .data:
x: 1, 7
p: 1, x
section .text:
_start: ld x
        add 3
        st *p
        jmp _start
"#;
        let image = compile(&parse(source).unwrap()).unwrap();

        // x's value word is at index 15 (byte 60), p's at 17 (byte 68)
        assert_eq!(
            image.records[10],
            Record::Instruction {
                index: 10,
                opcode: Opcode::Ld,
                arg: Some(60),
                mode: Some(AddrMode::Direct),
                line: 6,
            }
        );
        assert_eq!(
            image.records[11],
            Record::Instruction {
                index: 11,
                opcode: Opcode::Add,
                arg: Some(3),
                mode: Some(AddrMode::Value),
                line: 7,
            }
        );
        assert_eq!(
            image.records[12],
            Record::Instruction {
                index: 12,
                opcode: Opcode::St,
                arg: Some(68),
                mode: Some(AddrMode::Deref),
                line: 8,
            }
        );
        assert_eq!(
            image.records[13],
            Record::Instruction {
                index: 13,
                opcode: Opcode::Jmp,
                arg: Some(40),
                mode: Some(AddrMode::Direct),
                line: 9,
            }
        );

        // Data: x header, x value, p header, p value resolved to x's address
        assert_eq!(
            image.records[14],
            Record::Data { index: 14, label: None, value: 1, line: 3 }
        );
        assert_eq!(
            image.records[15],
            Record::Data { index: 15, label: Some("x".into()), value: 7, line: 3 }
        );
        assert_eq!(
            image.records[17],
            Record::Data { index: 17, label: Some("p".into()), value: 60, line: 4 }
        );
    }

    #[test]
    fn string_data_expands_to_code_points() {
        let source = "section .data:\ns: 2, \"hi\"\nsection .text:\n_start: hlt\n";
        let image = compile(&parse(source).unwrap()).unwrap();
        assert_eq!(
            image.records[11..],
            [
                Record::Data { index: 11, label: None, value: 2, line: 2 },
                Record::Data { index: 12, label: Some("s".into()), value: 'h' as Word, line: 2 },
                Record::Data { index: 13, label: None, value: 'i' as Word, line: 2 },
            ]
        );
    }

    #[test]
    fn vector_slot_points_at_handler() {
        let source = "section .text:\n_start: eni\nspin: jmp spin\nint1: fi\n";
        let image = compile(&parse(source).unwrap()).unwrap();
        // int1 is the third instruction: byte 40 + 2 * 4
        assert_eq!(
            image.records[0],
            Record::Data { index: 0, label: None, value: 48, line: 0 }
        );
    }

    #[test]
    fn undefined_label_test() {
        let err = compile(&parse("section .text:\n_start: ld nowhere\n").unwrap()).unwrap_err();
        assert_eq!(
            err,
            super::super::CompileError::Link(LinkError::UndefinedLabel {
                label: "nowhere".into(),
                line: 2,
            })
        );
    }
}
