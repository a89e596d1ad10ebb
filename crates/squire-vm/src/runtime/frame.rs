//! Stack frames.

use std::rc::Rc;

use crate::bytecode::Word;
use crate::error::{Error, Result};
use crate::gc::{GcRef, Traceable, Tracer};
use crate::runtime::journey::Pattern;
use crate::runtime::value::Value;

/// Activation record of one pattern invocation.
#[derive(Debug)]
pub struct StackFrame {
    /// The journey being run
    pub journey: GcRef,
    /// The pattern that bound
    pub pattern: Rc<Pattern>,
    /// Index of the next word to fetch
    pub ip: usize,
    /// Register file
    pub locals: Vec<Value>,
}

impl StackFrame {
    /// Creates a frame with every register set to ni.
    pub fn new(journey: GcRef, pattern: Rc<Pattern>) -> Self {
        let size = pattern.frame_size();
        Self {
            journey,
            pattern,
            ip: 0,
            locals: vec![Value::Ni; size],
        }
    }

    /// Reads a register.
    #[inline]
    pub fn local(&self, index: usize) -> Result<Value> {
        self.locals
            .get(index)
            .copied()
            .ok_or_else(|| Error::malformed(format!("register {index} out of range")))
    }

    /// Writes a register.
    #[inline]
    pub fn set_local(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self
            .locals
            .get_mut(index)
            .ok_or_else(|| Error::malformed(format!("register {index} out of range")))?;
        *slot = value;
        Ok(())
    }

    /// Whether the instruction pointer has run off the end of the code.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.ip >= self.pattern.codeblock.len()
    }

    /// Fetches the next word.
    #[inline]
    pub fn next_word(&mut self) -> Result<Word> {
        let word = self.pattern.codeblock.word(self.ip)?;
        self.ip += 1;
        Ok(word)
    }

    /// Fetches a literal count or index operand.
    #[inline]
    pub fn next_index(&mut self) -> Result<usize> {
        self.next_word().map(|w| w as usize)
    }

    /// Fetches a register operand and reads it.
    #[inline]
    pub fn next_local(&mut self) -> Result<Value> {
        let index = self.next_index()?;
        self.local(index)
    }

    /// Fetches a register operand and writes it.
    #[inline]
    pub fn set_next_local(&mut self, value: Value) -> Result<()> {
        let index = self.next_index()?;
        self.set_local(index, value)
    }

    /// Fetches a constant operand and loads the constant.
    #[inline]
    pub fn next_constant(&mut self) -> Result<Value> {
        let index = self.next_word()?;
        self.pattern.codeblock.constant(index)
    }

    /// Moves the instruction pointer, rejecting targets past the end.
    pub fn jump(&mut self, target: usize) -> Result<()> {
        if target > self.pattern.codeblock.len() {
            return Err(Error::malformed(format!("jump to {target} past end of code")));
        }
        self.ip = target;
        Ok(())
    }
}

impl Traceable for StackFrame {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_ref(self.journey);
        tracer.mark_all(&self.locals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Codeblock;
    use crate::runtime::journey::Parameter;

    fn frame(nlocals: usize, code: Vec<Word>) -> StackFrame {
        let block = Codeblock::new(nlocals, vec![Value::Numeral(7)], code);
        StackFrame::new(GcRef::new(0), Rc::new(Pattern::new(block)))
    }

    #[test]
    fn test_frame_new() {
        let frame = frame(3, vec![]);
        assert_eq!(frame.ip, 0);
        assert_eq!(frame.locals, vec![Value::Ni; 3]);
        assert!(frame.at_end());
    }

    #[test]
    fn test_frame_sized_by_parameters() {
        let block = Codeblock::new(1, Vec::new(), Vec::new());
        let pattern = Pattern::new(block)
            .positional(Parameter::new("a"))
            .positional(Parameter::new("b"))
            .with_splat();
        let frame = StackFrame::new(GcRef::new(0), Rc::new(pattern));
        assert_eq!(frame.locals.len(), 3);
    }

    #[test]
    fn test_locals() {
        let mut frame = frame(2, vec![]);
        frame.set_local(1, Value::YEA).unwrap();
        assert_eq!(frame.local(1).unwrap(), Value::YEA);
        assert!(frame.local(2).is_err());
        assert!(frame.set_local(5, Value::Ni).is_err());
    }

    #[test]
    fn test_operand_fetch() {
        let mut frame = frame(2, vec![0, 1, 0]);
        frame.set_local(1, Value::Numeral(3)).unwrap();

        assert_eq!(frame.next_constant().unwrap(), Value::Numeral(7));
        assert_eq!(frame.next_local().unwrap(), Value::Numeral(3));
        frame.set_next_local(Value::NAY).unwrap();
        assert_eq!(frame.local(0).unwrap(), Value::NAY);
        assert!(frame.at_end());
        assert!(frame.next_word().is_err());
    }

    #[test]
    fn test_jump_bounds() {
        let mut frame = frame(0, vec![0, 0]);
        frame.jump(2).unwrap();
        assert!(frame.at_end());
        assert!(frame.jump(3).is_err());
    }
}
