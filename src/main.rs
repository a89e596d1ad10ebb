// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! squire - runs compiled Squire programs
//!
//! This is the main entry point for the squire CLI.
//!
//! ## Commands
//!
//! - `squire run IMAGE [ARGS...]` loads a program image and runs its entry journey
//! - `squire disasm IMAGE` prints the instruction listing of every journey

mod cli;

use std::panic;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use owo_colors::OwoColorize;
use squire_vm::{Error, ProgramImage, Result, Vm, VmConfig};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, DisasmArgs, RunArgs};

/// Journey calls recurse on the host stack, so the interpreter gets its own.
const VM_STACK_SIZE: usize = 64 * 1024 * 1024;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Run(args) => on_vm_thread(move || run(args)),
        Commands::Disasm(args) => disasm(&args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn on_vm_thread(f: impl FnOnce() -> Result<()> + Send + 'static) -> Result<()> {
    let handle = thread::Builder::new()
        .name("squire-vm".into())
        .stack_size(VM_STACK_SIZE)
        .spawn(f)?;

    match handle.join() {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}

fn config(args: &RunArgs) -> VmConfig {
    let mut config = VmConfig::default();
    if let Some(slots) = args.heap_slots {
        config = config.with_heap_capacity(slots);
    }
    if let Some(frames) = args.max_frames {
        config = config.with_max_frames(frames);
    }
    config
}

/// Execute a program image.
fn run(args: RunArgs) -> Result<()> {
    let image = ProgramImage::read(&args.image)?;
    let mut vm = Vm::new(config(&args))?;
    image.load(&mut vm)?;

    let result = vm.run_main(&args.args);
    let stats = vm.teardown();
    debug!(
        collections = stats.collections,
        freed = stats.freed,
        "runtime torn down"
    );
    result.map(|_| ())
}

/// Print every journey of a program image.
fn disasm(args: &DisasmArgs) -> Result<()> {
    let image = ProgramImage::read(&args.image)?;
    let mut vm = Vm::new(VmConfig::default())?;
    for journey in image.load(&mut vm)? {
        println!("{}", vm.disassemble(journey)?);
    }
    Ok(())
}

fn report(err: &Error) -> ExitCode {
    match err {
        Error::Exit(_) => {}
        Error::Uncaught(dump) => {
            eprintln!("{} {}", "uncaught exception encountered:".red().bold(), dump);
        }
        _ => eprintln!("{}: {}", "Error".red().bold(), err),
    }
    ExitCode::from(err.exit_status())
}
