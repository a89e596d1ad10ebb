//! Compiled code for one journey pattern.

use crate::error::{Error, Result};
use crate::gc::{Traceable, Tracer};
use crate::runtime::value::Value;

/// One instruction-stream word.
pub type Word = u32;

/// A compiled codeblock: register count, constant pool, instruction words.
///
/// Immutable once built; every invocation of the owning pattern shares it.
#[derive(Debug, Clone, Default)]
pub struct Codeblock {
    nlocals: usize,
    constants: Vec<Value>,
    code: Vec<Word>,
}

impl Codeblock {
    /// Creates a codeblock.
    pub fn new(nlocals: usize, constants: Vec<Value>, code: Vec<Word>) -> Self {
        Self {
            nlocals,
            constants,
            code,
        }
    }

    /// Number of registers a frame needs.
    #[inline]
    pub fn nlocals(&self) -> usize {
        self.nlocals
    }

    /// The constant pool.
    #[inline]
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// The instruction words.
    #[inline]
    pub fn code(&self) -> &[Word] {
        &self.code
    }

    /// Number of instruction words.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether there are no instructions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The word at `ip`.
    #[inline]
    pub fn word(&self, ip: usize) -> Result<Word> {
        self.code
            .get(ip)
            .copied()
            .ok_or_else(|| Error::malformed(format!("instruction stream ends at {ip}")))
    }

    /// The constant at `index`.
    #[inline]
    pub fn constant(&self, index: Word) -> Result<Value> {
        self.constants
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::malformed(format!("constant {index} out of range")))
    }
}

impl Traceable for Codeblock {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_all(&self.constants);
    }
}
