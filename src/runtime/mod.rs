//! The simulated machine
//!
//! [`Machine`] owns the memory, the registers and the port table for one
//! run. The control unit executes one instruction per step and accounts its
//! declared tick cost; the interrupt controller sits at the instruction
//! boundary and may redirect the program counter before the next fetch.
//! [`run`] drives the whole thing until `hlt`, a fatal condition or the
//! driver's tick budget.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::constants as C;
use crate::image::{Image, Record};
use crate::isa::{AddrMode, Instr, Opcode};

mod exception;
mod memory;
mod ports;
mod registers;

pub use self::exception::{Fatal, Termination};
pub use self::memory::{Memory, MemoryError};
pub use self::ports::{InputEvent, PortId};
pub use self::registers::{Flags, Registers};

use self::ports::Ports;

type Result<T> = std::result::Result<T, Fatal>;

/// What the control unit does after an instruction
enum Flow {
    Continue,
    Halt,
}

/// Everything a run returns to the driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Output bytes per port, in program order
    pub outputs: BTreeMap<PortId, Vec<u8>>,

    /// Final register state
    pub registers: Registers,

    /// Total ticks spent
    pub ticks: u64,

    pub termination: Termination,

    /// Interrupts accepted
    pub interrupts: u64,

    /// `fi` returns executed
    pub irets: u64,
}

impl Report {
    /// The bytes written to one port; empty if the program never touched it
    pub fn output(&self, port: PortId) -> &[u8] {
        self.outputs.get(&port).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub struct Machine {
    pub memory: Memory,
    pub registers: Registers,
    ports: Ports,
    ticks: u64,
    max_ticks: u64,
    /// Source line per word index, for fatal diagnostics
    lines: Vec<u32>,
    interrupts: u64,
    irets: u64,
}

impl Machine {
    /// Load an image and an input schedule. Memory is sized once: the image
    /// plus a scratch data region.
    pub fn new(image: &Image, inputs: Vec<InputEvent>, max_ticks: u64) -> Self {
        let mut bytes =
            Vec::with_capacity(image.word_count() * C::WORD_BYTES as usize + C::DATA_REGION_BYTES);
        let mut lines = Vec::with_capacity(image.word_count());

        for record in &image.records {
            let word = match record {
                Record::Instruction { opcode, arg, mode, .. } => Instr {
                    opcode: *opcode,
                    mode: mode.unwrap_or(AddrMode::Value),
                    arg: arg.unwrap_or(0),
                }
                .encode(),
                Record::Data { value, .. } => *value as u32,
            };
            bytes.extend_from_slice(&word.to_le_bytes());
            lines.push(record.line());
        }
        bytes.resize(bytes.len() + C::DATA_REGION_BYTES, 0);

        Machine {
            memory: Memory::from_bytes(bytes),
            registers: Registers { pc: C::PROGRAM_START, ..Default::default() },
            ports: Ports::new(inputs),
            ticks: 0,
            max_ticks,
            lines,
            interrupts: 0,
            irets: 0,
        }
    }

    /// Run to termination and hand back the report.
    #[tracing::instrument(skip(self))]
    pub fn run(mut self) -> Report {
        let termination = loop {
            self.ports.deliver_due(self.ticks);

            if self.ticks >= self.max_ticks {
                break Termination::TicksExhausted;
            }

            let boundary = self.registers.pc;
            if let Err(kind) = self.accept_interrupt() {
                break self.fatal(kind, boundary);
            }

            let pc = self.registers.pc;
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => break Termination::Halt,
                Err(kind) => break self.fatal(kind, pc),
            }
        };

        info!(ticks = self.ticks, termination = %termination, "run finished");
        Report {
            outputs: self.ports.into_outputs(),
            registers: self.registers,
            ticks: self.ticks,
            termination,
            interrupts: self.interrupts,
            irets: self.irets,
        }
    }

    fn fatal(&self, kind: Fatal, pc: C::Address) -> Termination {
        let line = self
            .lines
            .get(pc as usize / C::WORD_BYTES as usize)
            .copied()
            .filter(|&line| line != 0);
        Termination::Fatal { kind, pc, line }
    }

    /// Fetch, decode and execute one instruction, accounting its ticks.
    fn step(&mut self) -> Result<Flow> {
        let pc = self.registers.pc;
        let word = self.memory.load_raw(pc)?;
        let instr = Instr::decode(word).map_err(|_| Fatal::InvalidOpcode)?;
        self.registers.pc = pc + C::WORD_BYTES;

        debug!(pc, %instr, "execute");
        let flow = self.execute(&instr)?;
        self.ticks += instr.cost();
        Ok(flow)
    }

    fn execute(&mut self, instr: &Instr) -> Result<Flow> {
        use Opcode::*;

        let Instr { opcode, mode, arg } = *instr;
        match opcode {
            Ld => {
                let value = self.fetch(mode, arg)?;
                self.registers.ac = value;
                self.registers.set_zn(value);
            }

            St => {
                let address = self.store_address(mode, arg)?;
                self.memory.store(address, self.registers.ac)?;
            }

            Add => self.binop(mode, arg, C::Word::wrapping_add)?,
            Sub => self.binop(mode, arg, C::Word::wrapping_sub)?,
            Mul => self.binop(mode, arg, C::Word::wrapping_mul)?,

            Div => {
                let value = self.fetch(mode, arg)?;
                if value == 0 {
                    return Err(Fatal::DivByZero);
                }
                // Truncating division; MIN / -1 wraps
                let result = self.registers.ac.wrapping_div(value);
                self.registers.ac = result;
                self.registers.set_zn(result);
            }

            And => self.binop(mode, arg, |a, b| a & b)?,
            Or => self.binop(mode, arg, |a, b| a | b)?,

            Cmp => {
                let value = self.fetch(mode, arg)?;
                let result = self.registers.ac.wrapping_sub(value);
                self.registers.set_zn(result);
            }

            Inc => self.unop(|ac| ac.wrapping_add(1)),
            Dec => self.unop(|ac| ac.wrapping_sub(1)),
            Asr => self.unop(|ac| ac >> 1),
            Lsl => self.unop(|ac| ac.wrapping_shl(1)),

            Jmp => self.registers.pc = self.jump_target(arg)?,
            Jz => self.branch(arg, self.registers.flags.contains(Flags::ZERO))?,
            Jnz => self.branch(arg, !self.registers.flags.contains(Flags::ZERO))?,
            Jn => self.branch(arg, self.registers.flags.contains(Flags::NEGATIVE))?,
            Jp => self.branch(arg, !self.registers.flags.contains(Flags::NEGATIVE))?,

            Out => {
                let byte = (self.registers.ac & 0xff) as u8;
                debug!(port = arg, byte, "out");
                self.ports.write(arg as PortId, byte);
            }

            In => {
                let byte = self
                    .ports
                    .read(arg as PortId)
                    .ok_or(Fatal::PortUnderflow)?;
                debug!(port = arg, byte, "in");
                // Zero-extended
                let value = C::Word::from(byte);
                self.registers.ac = value;
                self.registers.set_zn(value);
            }

            Int => {
                let flags = self.registers.flags;
                if flags.contains(Flags::INTERRUPT_ENABLE) && !flags.contains(Flags::IN_ISR) {
                    let target = self.vector_target(arg as u8)?;
                    if let Some(target) = target {
                        self.enter_handler(arg as u8, target)?;
                    }
                }
            }

            Eni => self.registers.flags.insert(Flags::INTERRUPT_ENABLE),
            Dii => self.registers.flags.remove(Flags::INTERRUPT_ENABLE),
            Fi => self.return_from_handler()?,

            Nop => {}
            Hlt => return Ok(Flow::Halt),
        }

        Ok(Flow::Continue)
    }

    /// Resolve an operand address, tracking it in AR
    fn operand_address(&mut self, word: C::Word) -> Result<C::Address> {
        let address = C::Address::try_from(word).map_err(|_| Fatal::MemoryOutOfRange)?;
        self.registers.ar = address;
        Ok(address)
    }

    /// Operand fetch, value form
    fn fetch(&mut self, mode: AddrMode, arg: C::Word) -> Result<C::Word> {
        let value = match mode {
            AddrMode::Value => arg,
            AddrMode::Direct | AddrMode::Deref => {
                let address = self.operand_address(arg)?;
                self.memory.load(address)?
            }
            AddrMode::Deref2 => {
                let address = self.operand_address(arg)?;
                let pointer = self.memory.load(address)?;
                let address = self.operand_address(pointer)?;
                self.memory.load(address)?
            }
        };
        self.registers.dr = value;
        Ok(value)
    }

    /// Operand fetch, address form: where `st` writes
    fn store_address(&mut self, mode: AddrMode, arg: C::Word) -> Result<C::Address> {
        match mode {
            AddrMode::Direct => self.operand_address(arg),
            AddrMode::Deref => {
                let address = self.operand_address(arg)?;
                let pointer = self.memory.load(address)?;
                self.operand_address(pointer)
            }
            // Decode never lets other modes through for st
            _ => Err(Fatal::InvalidOpcode),
        }
    }

    fn jump_target(&mut self, arg: C::Word) -> Result<C::Address> {
        self.operand_address(arg)
    }

    fn binop(&mut self, mode: AddrMode, arg: C::Word, op: fn(C::Word, C::Word) -> C::Word) -> Result<()> {
        let value = self.fetch(mode, arg)?;
        let result = op(self.registers.ac, value);
        self.registers.ac = result;
        self.registers.set_zn(result);
        Ok(())
    }

    fn unop(&mut self, op: fn(C::Word) -> C::Word) {
        let result = op(self.registers.ac);
        self.registers.ac = result;
        self.registers.set_zn(result);
    }

    fn branch(&mut self, arg: C::Word, taken: bool) -> Result<()> {
        if taken {
            self.registers.pc = self.jump_target(arg)?;
        }
        Ok(())
    }

    /// Read a vector slot; `None` means the slot is unbound and the vector
    /// cannot trigger.
    fn vector_target(&mut self, vector: u8) -> Result<Option<C::Address>> {
        let slot = C::Address::from(vector - 1) * C::WORD_BYTES;
        let target = self.memory.load(slot)?;
        if target == 0 {
            return Ok(None);
        }
        C::Address::try_from(target)
            .map(Some)
            .map_err(|_| Fatal::MemoryOutOfRange)
    }

    /// Save AC and PC to the prologue save words and jump into a handler.
    fn enter_handler(&mut self, vector: u8, target: C::Address) -> Result<()> {
        self.memory.store(C::AC_SAVE, self.registers.ac)?;
        self.memory.store(C::PC_SAVE, self.registers.pc as C::Word)?;
        info!(vector, target, "entering interrupt handler");
        self.registers.pc = target;
        self.registers.flags.remove(Flags::INTERRUPT_ENABLE);
        self.registers.flags.insert(Flags::IN_ISR);
        self.interrupts += 1;
        Ok(())
    }

    fn return_from_handler(&mut self) -> Result<()> {
        if !self.registers.flags.contains(Flags::IN_ISR) {
            return Err(Fatal::IsrMismatch);
        }
        self.registers.ac = self.memory.load(C::AC_SAVE)?;
        let pc = self.memory.load(C::PC_SAVE)?;
        self.registers.pc = C::Address::try_from(pc).map_err(|_| Fatal::MemoryOutOfRange)?;
        self.registers.flags.insert(Flags::INTERRUPT_ENABLE);
        self.registers.flags.remove(Flags::IN_ISR);
        self.irets += 1;
        debug!(pc = self.registers.pc, "returned from interrupt");
        Ok(())
    }

    /// At an instruction boundary, accept the lowest requesting vector if
    /// interrupts are enabled and no handler is already running.
    fn accept_interrupt(&mut self) -> Result<()> {
        let flags = self.registers.flags;
        if !flags.contains(Flags::INTERRUPT_ENABLE) || flags.contains(Flags::IN_ISR) {
            return Ok(());
        }

        let asserted: Vec<PortId> = self.ports.asserted().collect();
        for port in asserted {
            if let Some(target) = self.vector_target(port)? {
                self.ports.acknowledge(port);
                self.enter_handler(port, target)?;
                break;
            }
        }
        Ok(())
    }
}

/// Execute an image against an input schedule and a tick budget.
///
/// Deterministic: the report is a pure function of the arguments.
pub fn run(image: &Image, inputs: Vec<InputEvent>, max_ticks: u64) -> Report {
    Machine::new(image, inputs, max_ticks).run()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::compiler::translate;

    fn machine(source: &str) -> Machine {
        let image = translate(source).unwrap();
        Machine::new(&image, vec![], 10_000)
    }

    #[test]
    fn flags_track_the_accumulator() {
        let mut machine = machine(
            "section .text:\n_start: ld 5\nsub 5\ndec\nasr\ninc\nlsl\nhlt\n",
        );
        for _ in 0..6 {
            machine.step().unwrap();
            let flags = machine.registers.flags;
            assert_eq!(flags.contains(Flags::ZERO), machine.registers.ac == 0);
            assert_eq!(flags.contains(Flags::NEGATIVE), machine.registers.ac < 0);
        }
        // ld 5, sub 5 -> 0, dec -> -1, asr -> -1, inc -> 0, lsl -> 0
        assert_eq!(machine.registers.ac, 0);
    }

    #[test]
    fn cmp_leaves_ac_alone() {
        let mut machine = machine("section .text:\n_start: ld 7\ncmp 7\nhlt\n");
        machine.step().unwrap();
        machine.step().unwrap();
        assert_eq!(machine.registers.ac, 7);
        assert!(machine.registers.flags.contains(Flags::ZERO));
    }

    #[test]
    fn ticks_follow_declared_costs() {
        let source = r#"
section .data:
x: 1, 9
p: 1, x
section .text:
_start: ld 1
        ld x
        ld **p
        st x
        hlt
"#;
        let mut machine = machine(source);
        machine.step().unwrap(); // ld 1: value, 1 tick
        assert_eq!(machine.ticks, 1);
        machine.step().unwrap(); // ld x: direct, 2 ticks
        assert_eq!(machine.ticks, 3);
        machine.step().unwrap(); // ld **p: two reads, 3 ticks
        assert_eq!(machine.ticks, 6);
        machine.step().unwrap(); // st x: a read-free write, 2 ticks
        assert_eq!(machine.ticks, 8);
    }

    #[test]
    fn deref_fetch_and_store() {
        let source = r#"
section .data:
x: 1, 11
p: 1, x
section .text:
_start: ld **p
        add 1
        st *p
        ld x
        hlt
"#;
        let report = run(&translate(source).unwrap(), vec![], 1000);
        assert!(report.termination.is_halt());
        assert_eq!(report.registers.ac, 12);
    }

    #[test]
    fn division_truncates_toward_zero() {
        let report = run(
            &translate("section .text:\n_start: ld -7\ndiv 2\nhlt\n").unwrap(),
            vec![],
            100,
        );
        assert_eq!(report.registers.ac, -3);
    }

    #[test]
    fn unaligned_pointer_is_fatal() {
        let source = "section .data:\np: 1, 2\nsection .text:\n_start: ld **p\n";
        let report = run(&translate(source).unwrap(), vec![], 100);
        assert_eq!(
            report.termination,
            Termination::Fatal {
                kind: Fatal::MisalignedAccess,
                pc: C::PROGRAM_START,
                line: Some(4),
            }
        );
    }

    #[test]
    fn in_on_empty_port_underflows() {
        let report = run(
            &translate("section .text:\n_start: in 5\n").unwrap(),
            vec![],
            100,
        );
        assert_eq!(
            report.termination,
            Termination::Fatal {
                kind: Fatal::PortUnderflow,
                pc: C::PROGRAM_START,
                line: Some(2),
            }
        );
    }

    #[test]
    fn fi_outside_a_handler_is_fatal() {
        let report = run(
            &translate("section .text:\n_start: fi\n").unwrap(),
            vec![],
            100,
        );
        assert!(matches!(
            report.termination,
            Termination::Fatal { kind: Fatal::IsrMismatch, .. }
        ));
    }

    #[test]
    fn lowest_vector_wins_and_no_nesting() {
        // Both ports raise at tick 0; the port 1 handler runs first and the
        // port 2 request stays pending until `fi`.
        let source = r#"
section .text:
_start: eni
spin:   jmp spin
int1:   in 1
        out 3
        fi
int2:   in 2
        out 3
        fi
"#;
        let inputs = vec![
            InputEvent { tick: 0, port: 2, byte: b'2' },
            InputEvent { tick: 0, port: 1, byte: b'1' },
        ];
        let report = run(&translate(source).unwrap(), inputs, 200);
        assert_eq!(report.output(3), b"12");
        assert_eq!(report.interrupts, 2);
        assert_eq!(report.irets, 2);
    }

    #[test]
    fn masked_interrupts_stay_pending() {
        // Interrupts are never enabled, so the request is never taken
        let source = "section .text:\n_start: jmp _start\nint1: fi\n";
        let inputs = vec![InputEvent { tick: 0, port: 1, byte: b'x' }];
        let report = run(&translate(source).unwrap(), inputs, 100);
        assert_eq!(report.interrupts, 0);
        assert_eq!(report.termination, Termination::TicksExhausted);
    }

    #[test]
    fn int_instruction_enters_bound_handler() {
        let source = r#"
section .text:
_start: eni
        int 1
        hlt
int1:   ld 1
        out 3
        fi
"#;
        let report = run(&translate(source).unwrap(), vec![], 100);
        assert!(report.termination.is_halt());
        assert_eq!(report.output(3), [1]);
        assert_eq!(report.irets, 1);
    }

    #[test]
    fn int_with_interrupts_disabled_is_a_nop() {
        let source = r#"
section .text:
_start: int 1
        hlt
int1:   out 3
        fi
"#;
        let report = run(&translate(source).unwrap(), vec![], 100);
        assert!(report.termination.is_halt());
        assert_eq!(report.output(3), b"");
        assert_eq!(report.interrupts, 0);
    }

    #[test]
    fn runs_are_deterministic() {
        let source = r#"
section .text:
_start: eni
spin:   jmp spin
int1:   in 1
        out 3
        fi
"#;
        let image = translate(source).unwrap();
        let inputs = vec![InputEvent { tick: 7, port: 1, byte: b'q' }];
        let first = run(&image, inputs.clone(), 500);
        let second = run(&image, inputs, 500);
        assert_eq!(first, second);
    }
}
