//! Command-line argument parsing for squire.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// squire - runs compiled Squire program images
#[derive(Parser, Debug)]
#[command(name = "squire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a program image and run its entry journey
    Run(RunArgs),

    /// Print the instruction listing of every journey in an image
    #[command(alias = "dis")]
    Disasm(DisasmArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the program image
    pub image: PathBuf,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Number of heap slots
    #[arg(long, env = "SQUIRE_HEAP_SLOTS")]
    pub heap_slots: Option<usize>,

    /// Maximum depth of nested journey calls
    #[arg(long, env = "SQUIRE_MAX_FRAMES")]
    pub max_frames: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DisasmArgs {
    /// Path to the program image
    pub image: PathBuf,
}
