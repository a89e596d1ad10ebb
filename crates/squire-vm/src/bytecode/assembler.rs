//! Incremental construction of codeblocks.
//!
//! The compiler is a separate collaborator. It and the tests use this
//! assembler to lay out registers, constants and jump targets without
//! counting words by hand.

use super::codeblock::{Codeblock, Word};
use super::opcode::{Interrupt, Opcode};
use crate::error::{Error, Result};
use crate::runtime::value::Value;

/// A jump target that may be bound after it is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Builds a [`Codeblock`].
#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<Word>,
    constants: Vec<Value>,
    nlocals: usize,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl Assembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an assembler whose first `count` registers are reserved,
    /// typically for bound parameters.
    pub fn with_locals(count: usize) -> Self {
        Self {
            nlocals: count,
            ..Self::default()
        }
    }

    /// Allocates a fresh register.
    pub fn local(&mut self) -> Word {
        let index = self.nlocals;
        self.nlocals += 1;
        index as Word
    }

    /// Adds a constant, reusing an identical one already in the pool.
    pub fn constant(&mut self, value: Value) -> Word {
        if let Some(index) = self.constants.iter().position(|&c| c == value) {
            return index as Word;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as Word
    }

    /// Index of the next word to be emitted.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Creates an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds a label to the current position.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    /// Emits an opcode followed by raw operand words.
    pub fn op(&mut self, opcode: Opcode, operands: &[Word]) -> &mut Self {
        self.code.push(opcode.word());
        self.code.extend_from_slice(operands);
        self
    }

    /// Emits an interrupt followed by raw operand words.
    pub fn interrupt(&mut self, interrupt: Interrupt, operands: &[Word]) -> &mut Self {
        self.code.push(Opcode::Int.word());
        self.code.push(interrupt.word());
        self.code.extend_from_slice(operands);
        self
    }

    fn target(&mut self, label: Label) {
        self.fixups.push((self.code.len(), label));
        self.code.push(Word::MAX);
    }

    /// `JMP label`
    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.code.push(Opcode::Jmp.word());
        self.target(label);
        self
    }

    /// `JMP_TRUE cond label` when `sense`, else `JMP_FALSE cond label`.
    pub fn jump_if(&mut self, cond: Word, sense: bool, label: Label) -> &mut Self {
        let opcode = if sense { Opcode::JmpTrue } else { Opcode::JmpFalse };
        self.code.push(opcode.word());
        self.code.push(cond);
        self.target(label);
        self
    }

    /// `TRYCATCH label err`
    pub fn try_catch(&mut self, label: Label, err: Word) -> &mut Self {
        self.code.push(Opcode::TryCatch.word());
        self.target(label);
        self.code.push(err);
        self
    }

    /// Loads a constant into a fresh register and returns the register.
    pub fn load(&mut self, value: Value) -> Word {
        let index = self.constant(value);
        let dst = self.local();
        self.op(Opcode::CLoad, &[index, dst]);
        dst
    }

    /// Loads a global into a fresh register and returns the register.
    pub fn load_global(&mut self, global: Word) -> Word {
        let dst = self.local();
        self.op(Opcode::GLoad, &[global, dst]);
        dst
    }

    /// Emits a binary operation into a fresh register and returns it.
    pub fn binary(&mut self, opcode: Opcode, lhs: Word, rhs: Word) -> Word {
        let dst = self.local();
        self.op(opcode, &[lhs, rhs, dst]);
        dst
    }

    /// Emits a positional call into a fresh register and returns it.
    pub fn call(&mut self, callee: Word, args: &[Word]) -> Word {
        let dst = self.local();
        self.code.push(Opcode::Call.word());
        self.code.push(callee);
        self.code.push(args.len() as Word);
        self.code.extend_from_slice(args);
        self.code.push(dst);
        dst
    }

    /// Emits a call with keyword arguments into a fresh register.
    pub fn call_kw(&mut self, callee: Word, args: &[Word], keywords: &[(Word, Word)]) -> Word {
        let dst = self.local();
        self.code.push(Opcode::CallKw.word());
        self.code.push(callee);
        self.code.push(args.len() as Word);
        self.code.extend_from_slice(args);
        self.code.push(keywords.len() as Word);
        for &(name, arg) in keywords {
            self.code.push(name);
            self.code.push(arg);
        }
        self.code.push(dst);
        dst
    }

    /// `RETURN reg`
    pub fn ret(&mut self, reg: Word) -> &mut Self {
        self.op(Opcode::Return, &[reg])
    }

    /// Resolves labels and produces the codeblock.
    pub fn finish(mut self) -> Result<Codeblock> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = self.labels[label.0]
                .ok_or_else(|| Error::malformed(format!("label {} never bound", label.0)))?;
            self.code[at] = target as Word;
        }
        Ok(Codeblock::new(self.nlocals, self.constants, self.code))
    }
}
