//! Command-line interface.

pub mod args;
pub mod commands;

pub use args::{Args, Command};

use anyhow::Result;

/// Execute a parsed command line.
pub fn execute(args: Args) -> Result<()> {
    match &args.command {
        Command::Info => commands::info(&args),
        Command::List => commands::list(),
        Command::Read { output } => commands::read(&args, output),
        Command::Write { input } => commands::write(&args, input),
        Command::Erase => commands::erase(&args),
    }
}
