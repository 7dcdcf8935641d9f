//! piconand - raw NAND programmer for Pico-class bus adapters
//!
//! This is the main entry point for the CLI application.

use clap::Parser;
use log::info;

use piconand::cli::{self, Args};

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    info!("piconand v{}", env!("CARGO_PKG_VERSION"));

    // Execute the command; any failure exits with status 1
    if let Err(e) = cli::execute(args) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
