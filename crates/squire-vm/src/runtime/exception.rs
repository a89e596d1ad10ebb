//! Exception handler stack and the unwinding outcome.
//!
//! A throw stores the thrown value in the current-exception slot and
//! returns [`Unwind::Thrown`] up the Rust call chain. Each frame's loop
//! checks whether the newest handler belongs to it; if so it resumes
//! there, otherwise it returns the same outcome to its caller, dropping
//! its frame on the way.

use std::fmt;

use crate::error::Error;
use crate::gc::{Traceable, Tracer};
use crate::runtime::value::Value;

/// Result of running Squire code.
pub type RunResult<T> = std::result::Result<T, Unwind>;

/// Why execution left the normal path.
#[derive(Debug)]
pub enum Unwind {
    /// A value was thrown; it sits in the current-exception slot.
    Thrown,
    /// Something no handler may intercept.
    Fatal(Error),
}

impl Unwind {
    /// Whether this is a catchable throw.
    pub fn is_thrown(&self) -> bool {
        matches!(self, Unwind::Thrown)
    }
}

impl From<Error> for Unwind {
    fn from(err: Error) -> Self {
        Unwind::Fatal(err)
    }
}

impl fmt::Display for Unwind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unwind::Thrown => f.write_str("exception thrown"),
            Unwind::Fatal(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Unwind {}

/// A resumption record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    /// Depth of the frame that installed it
    pub frame: usize,
    /// Instruction to resume at
    pub resume: usize,
    /// Register receiving the exception
    pub register: usize,
}

/// Bounded stack of handlers plus the current-exception slot.
#[derive(Debug)]
pub struct HandlerStack {
    records: Vec<Handler>,
    limit: usize,
    exception: Value,
}

impl HandlerStack {
    /// Creates an empty stack holding at most `limit` handlers.
    pub fn new(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit,
            exception: Value::Ni,
        }
    }

    /// Installs a handler. Returns false when the stack is full.
    pub fn push(&mut self, handler: Handler) -> bool {
        if self.records.len() >= self.limit {
            return false;
        }
        self.records.push(handler);
        true
    }

    /// Removes the newest handler on normal exit from its region.
    pub fn pop(&mut self) -> Option<Handler> {
        self.records.pop()
    }

    /// Number of installed handlers.
    pub fn depth(&self) -> usize {
        self.records.len()
    }

    /// Stores a thrown value.
    pub fn throw(&mut self, value: Value) {
        self.exception = value;
    }

    /// The current exception, ni when none is in flight.
    pub fn exception(&self) -> Value {
        self.exception
    }

    /// Takes the current exception, leaving ni behind.
    pub fn take_exception(&mut self) -> Value {
        std::mem::take(&mut self.exception)
    }

    /// Pops the newest handler if it was installed by frame `frame`.
    pub fn catch_in(&mut self, frame: usize) -> Option<Handler> {
        match self.records.last() {
            Some(handler) if handler.frame == frame => self.records.pop(),
            _ => None,
        }
    }

    /// Drops every handler installed by frame `frame` or deeper.
    pub fn discard_frame(&mut self, frame: usize) {
        while self.records.last().is_some_and(|h| h.frame >= frame) {
            self.records.pop();
        }
    }
}

impl Traceable for HandlerStack {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark(self.exception);
    }
}
