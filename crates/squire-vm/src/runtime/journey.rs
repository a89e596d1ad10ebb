//! Journeys: named groups of patterns tried in declaration order.
//!
//! Register layout of a pattern's frame:
//!
//! ```text
//! [positional...][splat?][keywords...][splatsplat?][scratch...]
//! ```

use std::rc::Rc;

use crate::bytecode::Codeblock;
use crate::gc::{Traceable, Tracer};
use crate::runtime::value::Value;

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Entry point of the default-value sub-program
    pub default: Option<usize>,
    /// Entry point of the genus guard sub-program
    pub guard: Option<usize>,
}

impl Parameter {
    /// A required, unguarded parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            guard: None,
        }
    }

    /// Adds a default-value entry point.
    pub fn with_default(mut self, start: usize) -> Self {
        self.default = Some(start);
        self
    }

    /// Adds a genus guard entry point.
    pub fn with_guard(mut self, start: usize) -> Self {
        self.guard = Some(start);
        self
    }
}

/// One overload of a journey.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Positional parameters
    pub positional: Vec<Parameter>,
    /// Keyword parameters
    pub keywords: Vec<Parameter>,
    /// Whether surplus positional arguments are collected into a book
    pub splat: bool,
    /// Whether unknown keyword arguments are collected into a codex
    pub splatsplat: bool,
    /// Entry point of the overall guard
    pub condition: Option<usize>,
    /// Entry point of the body
    pub start: usize,
    /// Compiled code shared by the body, defaults and guards
    pub codeblock: Codeblock,
}

impl Pattern {
    /// A pattern with no parameters whose body starts at 0.
    pub fn new(codeblock: Codeblock) -> Self {
        Self {
            positional: Vec::new(),
            keywords: Vec::new(),
            splat: false,
            splatsplat: false,
            condition: None,
            start: 0,
            codeblock,
        }
    }

    /// Appends a positional parameter.
    pub fn positional(mut self, parameter: Parameter) -> Self {
        self.positional.push(parameter);
        self
    }

    /// Appends a keyword parameter.
    pub fn keyword(mut self, parameter: Parameter) -> Self {
        self.keywords.push(parameter);
        self
    }

    /// Collects surplus positional arguments.
    pub fn with_splat(mut self) -> Self {
        self.splat = true;
        self
    }

    /// Collects unknown keyword arguments.
    pub fn with_splatsplat(mut self) -> Self {
        self.splatsplat = true;
        self
    }

    /// Adds an overall guard.
    pub fn with_condition(mut self, start: usize) -> Self {
        self.condition = Some(start);
        self
    }

    /// Sets the body entry point.
    pub fn starting_at(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    /// Register receiving the splat book.
    pub fn splat_register(&self) -> usize {
        self.positional.len()
    }

    /// Register receiving keyword parameter `index`.
    pub fn keyword_register(&self, index: usize) -> usize {
        self.positional.len() + usize::from(self.splat) + index
    }

    /// Register receiving the splatsplat codex.
    pub fn splatsplat_register(&self) -> usize {
        self.keyword_register(self.keywords.len())
    }

    /// Number of registers filled by binding.
    pub fn bound_registers(&self) -> usize {
        self.splatsplat_register() + usize::from(self.splatsplat)
    }

    /// Registers a frame running this pattern needs.
    pub fn frame_size(&self) -> usize {
        self.codeblock.nlocals().max(self.bound_registers())
    }

    /// Position of a keyword parameter.
    pub fn keyword_index(&self, name: &str) -> Option<usize> {
        self.keywords.iter().position(|p| p.name == name)
    }
}

impl Traceable for Pattern {
    fn trace(&self, tracer: &mut Tracer) {
        self.codeblock.trace(tracer);
    }
}

/// A callable made of one or more patterns.
#[derive(Debug, Clone)]
pub struct Journey {
    /// Name used in diagnostics and attribute lookup
    pub name: String,
    /// Overloads in declaration order
    pub patterns: Vec<Rc<Pattern>>,
}

impl Journey {
    /// Creates a journey.
    pub fn new(name: impl Into<String>, patterns: Vec<Pattern>) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Rc::new).collect(),
        }
    }

    /// Positional parameter count of the first pattern.
    pub fn arity(&self) -> usize {
        self.patterns.first().map_or(0, |p| p.positional.len())
    }
}

impl Traceable for Journey {
    fn trace(&self, tracer: &mut Tracer) {
        for pattern in &self.patterns {
            pattern.trace(tracer);
        }
    }
}

/// Arguments of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    /// Positional arguments
    pub positional: Vec<Value>,
    /// Keyword arguments in call order
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    /// Positional-only arguments.
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    /// Adds a keyword argument.
    pub fn with_keyword(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keywords.push((name.into(), value));
        self
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// Whether there are no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Args::new(positional)
    }
}

impl Traceable for Args {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_all(&self.positional);
        for &(_, value) in &self.keywords {
            tracer.mark(value);
        }
    }
}
