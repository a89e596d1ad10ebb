// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # squire-vm
//!
//! The runtime core of the Squire language.
//!
//! ## Overview
//!
//! This crate executes compiled Squire programs:
//! - Register-based bytecode interpreter
//! - Multi-pattern journeys with positional, splat, keyword and
//!   splatsplat binding, defaults and genus guards
//! - Forms, imitations and the attribute protocol
//! - Structured exceptions that unwind across journey calls
//! - Mark-sweep garbage collection over a fixed arena
//! - Program images a compiler writes and the runtime loads
//!
//! ## Quick Start
//!
//! ```rust
//! use squire_vm::{Assembler, Opcode, Pattern, Value, Vm, VmConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut vm = Vm::new(VmConfig::default())?;
//!
//! let mut asm = Assembler::new();
//! let two = asm.load(Value::Numeral(2));
//! let three = asm.load(Value::Numeral(3));
//! let sum = asm.binary(Opcode::Add, two, three);
//! asm.ret(sum);
//!
//! let main = vm.define_journey("main", vec![Pattern::new(asm.finish()?)])?;
//! vm.set_main(main)?;
//! assert_eq!(vm.run_main(&[])?, Value::Numeral(5));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bytecode;
pub mod config;
pub mod error;
pub mod gc;
pub mod image;
pub mod runtime;
pub mod vm;

// Re-exports for convenience
pub use bytecode::{Assembler, Codeblock, Interrupt, Label, Opcode, Word};
pub use config::VmConfig;
pub use error::{Error, Result};
pub use gc::{GcRef, HeapStats, SweepStats};
pub use image::ProgramImage;
pub use runtime::{
    Args, Essence, Form, Genus, Journey, Matter, NativeFn, Parameter, Pattern, RunResult, Scroll,
    Unwind, Value,
};
pub use vm::{MIN_HEAP_SLOTS, Vm};
