//! Runtime data model.

pub mod exception;
pub mod form;
pub mod frame;
pub mod journey;
pub mod native;
pub mod numeral;
pub mod program;
pub mod scroll;
pub mod value;

pub use exception::{Handler, HandlerStack, RunResult, Unwind};
pub use form::{Essence, Form, Imitation, Matter};
pub use frame::StackFrame;
pub use journey::{Args, Journey, Parameter, Pattern};
pub use native::{NativeFn, NativeJourney, Other};
pub use program::Program;
pub use scroll::Scroll;
pub use value::{Genus, Value};
