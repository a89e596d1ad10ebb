//! The program root: globals and the entry journey.

use crate::gc::{GcRef, Traceable, Tracer};
use crate::runtime::value::Value;

/// Global state of a loaded program.
#[derive(Debug, Default)]
pub struct Program {
    /// Global slots
    pub globals: Vec<Value>,
    /// Names of the global slots, for diagnostics
    pub global_names: Vec<String>,
    /// Journey run by [`Vm::run_main`](crate::Vm::run_main)
    pub main: Option<GcRef>,
    /// Global that receives the command-line arguments
    pub argv_global: Option<usize>,
}

impl Program {
    /// An empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global and returns its index.
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) -> usize {
        self.globals.push(value);
        self.global_names.push(name.into());
        self.globals.len() - 1
    }

    /// Index of the global with the given name.
    pub fn global_index(&self, name: &str) -> Option<usize> {
        self.global_names.iter().position(|n| n == name)
    }
}

impl Traceable for Program {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_all(&self.globals);
        self.main.trace(tracer);
    }
}
