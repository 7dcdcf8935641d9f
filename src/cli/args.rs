//! CLI argument definitions using clap
//!
//! This module defines the command-line argument structure.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// piconand - raw NAND programmer for Pico-class bus adapters
///
/// Reads, writes, and erases raw parallel NAND chips through a serial bus
/// adapter, with resumable operations and per-page CRC validation.
#[derive(Parser, Debug)]
#[command(name = "piconand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Serial endpoint (substring of the product or serial string), or "sim"
    /// for the built-in simulated chip
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Configuration file (default: ~/.piconand/config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Force the legacy line-oriented transport
    #[arg(long, global = true)]
    pub legacy: bool,

    /// Keep OOB (spare) areas in dumps / expect them in write images
    #[arg(long, global = true)]
    pub include_oob: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect and display information about the connected chip
    #[command(alias = "i")]
    Info,

    /// List all supported NAND chips
    #[command(alias = "L")]
    List,

    /// Read the whole chip to a file
    #[command(alias = "r")]
    Read {
        /// Output file path
        output: PathBuf,
    },

    /// Write a file to the chip
    #[command(alias = "w")]
    Write {
        /// Input file path
        input: PathBuf,
    },

    /// Erase the whole chip
    #[command(alias = "e")]
    Erase,
}
