//! Human-readable listings of codeblocks.

use super::codeblock::{Codeblock, Word};
use super::opcode::{Interrupt, Opcode};
use crate::error::{Error, Result};
use crate::runtime::value::Value;

/// How an operand word is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Register index
    Reg,
    /// Constant pool index
    Const,
    /// Instruction position
    Pos,
    /// Global slot index
    Global,
    /// Form field index
    Field,
    /// `N, REG*N`
    Regs,
    /// `N, (REG, REG)*N`
    Pairs,
    /// `K, (CONST, REG)*K`
    Keywords,
}

use Slot::*;

fn opcode_layout(opcode: Opcode) -> &'static [Slot] {
    match opcode {
        Opcode::Noop | Opcode::PopTryCatch => &[],
        Opcode::Mov | Opcode::Not | Opcode::Neg | Opcode::PatNot => &[Reg, Reg],
        Opcode::Int => &[],
        Opcode::Jmp => &[Pos],
        Opcode::JmpTrue | Opcode::JmpFalse => &[Reg, Pos],
        Opcode::Call => &[Reg, Regs, Reg],
        Opcode::CallKw => &[Reg, Regs, Keywords, Reg],
        Opcode::Return | Opcode::Throw => &[Reg],
        Opcode::TryCatch => &[Pos, Reg],
        Opcode::Eql
        | Opcode::Neq
        | Opcode::Lth
        | Opcode::Gth
        | Opcode::Leq
        | Opcode::Geq
        | Opcode::Cmp
        | Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::Pow
        | Opcode::Index
        | Opcode::Matches
        | Opcode::PatAnd
        | Opcode::PatOr
        | Opcode::IndexAssign => &[Reg, Reg, Reg],
        Opcode::CLoad => &[Const, Reg],
        Opcode::GLoad => &[Global, Reg],
        Opcode::GStore => &[Reg, Global],
        Opcode::ILoad => &[Reg, Const, Reg],
        Opcode::IStore => &[Reg, Reg, Const],
        Opcode::FeGenusStore | Opcode::FmGenusStore => &[Reg, Reg, Field],
    }
}

fn interrupt_layout(interrupt: Interrupt) -> &'static [Slot] {
    match interrupt {
        Interrupt::Prompt | Interrupt::Random | Interrupt::Exit => &[Reg],
        Interrupt::CodexNew => &[Pairs, Reg],
        Interrupt::BookNew => &[Regs, Reg],
        Interrupt::Substr | Interrupt::ArrayInsert => &[Reg, Reg, Reg, Reg],
        Interrupt::ArrayDelete | Interrupt::Fopen => &[Reg, Reg, Reg],
        Interrupt::Babel => &[Reg, Reg, Regs, Reg],
        _ => &[Reg, Reg],
    }
}

struct Cursor<'a> {
    block: &'a Codeblock,
    ip: usize,
}

impl Cursor<'_> {
    fn next(&mut self) -> Result<Word> {
        let word = self.block.word(self.ip)?;
        self.ip += 1;
        Ok(word)
    }
}

/// Lists every instruction of `block`, one per line.
///
/// Constants are rendered with `describe`.
pub fn disassemble(block: &Codeblock, describe: &dyn Fn(Value) -> String) -> Result<String> {
    let mut out = String::new();
    let mut cursor = Cursor { block, ip: 0 };

    while cursor.ip < block.len() {
        let ip = cursor.ip;
        let word = cursor.next()?;
        let opcode = Opcode::decode(word).ok_or(Error::UnknownOpcode { opcode: word, ip })?;

        let mut mnemonic = opcode.mnemonic().to_string();
        let layout = if opcode == Opcode::Int {
            let at = cursor.ip;
            let word = cursor.next()?;
            let interrupt = Interrupt::decode(word).ok_or(Error::UnknownInterrupt { interrupt: word, ip: at })?;
            mnemonic = format!("INT {}", interrupt.mnemonic());
            interrupt_layout(interrupt)
        } else {
            opcode_layout(opcode)
        };

        let mut operands = Vec::with_capacity(layout.len());
        for &slot in layout {
            operands.push(operand(&mut cursor, slot, describe)?);
        }

        let line = format!("{ip:04}  {mnemonic:<18}{}", operands.join(", "));
        out.push_str(line.trim_end());
        out.push('\n');
    }

    Ok(out)
}

fn operand(cursor: &mut Cursor<'_>, slot: Slot, describe: &dyn Fn(Value) -> String) -> Result<String> {
    let word = cursor.next()?;
    Ok(match slot {
        Reg => format!("r{word}"),
        Const => describe(cursor.block.constant(word)?),
        Pos => format!("@{word}"),
        Global => format!("g{word}"),
        Field => format!("#{word}"),
        Regs => {
            let mut regs = Vec::with_capacity(word as usize);
            for _ in 0..word {
                regs.push(format!("r{}", cursor.next()?));
            }
            format!("[{}]", regs.join(" "))
        }
        Pairs => {
            let mut pairs = Vec::with_capacity(word as usize);
            for _ in 0..word {
                let key = cursor.next()?;
                let value = cursor.next()?;
                pairs.push(format!("r{key}: r{value}"));
            }
            format!("{{{}}}", pairs.join(" "))
        }
        Keywords => {
            let mut keywords = Vec::with_capacity(word as usize);
            for _ in 0..word {
                let name = describe(cursor.block.constant(cursor.next()?)?);
                let value = cursor.next()?;
                keywords.push(format!("{name}=r{value}"));
            }
            format!("{{{}}}", keywords.join(" "))
        }
    })
}
