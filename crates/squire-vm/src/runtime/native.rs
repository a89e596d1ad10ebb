//! Heap objects of genus `Other`: host journeys, pattern helpers and
//! scrolls.

use std::fmt;

use crate::gc::{Traceable, Tracer};
use crate::runtime::exception::RunResult;
use crate::runtime::journey::Args;
use crate::runtime::scroll::Scroll;
use crate::runtime::value::Value;
use crate::vm::Vm;

/// Signature of a host-implemented journey.
pub type NativeFn = fn(&mut Vm, &Args) -> RunResult<Value>;

/// A journey implemented in Rust.
#[derive(Clone)]
pub struct NativeJourney {
    /// Name used in diagnostics
    pub name: String,
    /// Required positional count, or `None` for any
    pub arity: Option<usize>,
    /// Host function
    pub func: NativeFn,
}

impl fmt::Debug for NativeJourney {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeJourney({})", self.name)
    }
}

/// Every `Other` object.
#[derive(Debug)]
pub enum Other {
    /// Host journey
    Native(NativeJourney),
    /// Matches when both sides match
    And(Value, Value),
    /// Matches when either side matches
    Or(Value, Value),
    /// Matches when the inner pattern does not
    Not(Value),
    /// Open file
    Scroll(Scroll),
}

impl Other {
    /// Name shown in diagnostics.
    pub fn describe(&self) -> &str {
        match self {
            Other::Native(native) => &native.name,
            Other::And(..) => "pattern-and",
            Other::Or(..) => "pattern-or",
            Other::Not(_) => "pattern-not",
            Other::Scroll(scroll) => scroll.filename(),
        }
    }
}

impl Traceable for Other {
    fn trace(&self, tracer: &mut Tracer) {
        match *self {
            Other::Native(_) | Other::Scroll(_) => {}
            Other::And(lhs, rhs) | Other::Or(lhs, rhs) => {
                tracer.mark(lhs);
                tracer.mark(rhs);
            }
            Other::Not(inner) => tracer.mark(inner),
        }
    }
}
