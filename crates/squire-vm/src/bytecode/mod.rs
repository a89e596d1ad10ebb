//! Instruction set and codeblocks.

pub mod assembler;
pub mod codeblock;
pub mod disasm;
pub mod opcode;

pub use assembler::{Assembler, Label};
pub use codeblock::{Codeblock, Word};
pub use opcode::{Interrupt, MAX_ARITY, Opcode};
