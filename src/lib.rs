//! piconand library
//!
//! This library programs raw parallel NAND flash chips through a Pico-class
//! microcontroller acting as a bus adapter. The host side talks to the
//! adapter over USB CDC serial using a CRC-protected framed protocol (with a
//! legacy line-oriented fallback) and keeps resumable on-disk checkpoints for
//! long operations.
//!
//! # Architecture
//!
//! - [`domain`]: Chip descriptors, ECC verification, dump post-processing
//! - [`wire`]: Framed protocol, CRC primitives, byte-link abstraction
//! - [`device`]: Adapter-side bus driver and operation engine
//! - [`host`]: Serial discovery, checkpoint store, orchestration engine
//! - [`registry`]: Static table of supported NAND chips
//! - [`cli`]: Command-line interface
//! - [`error`]: Error types and handling
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use piconand::cli::{self, Args};
//!
//! let args = Args::parse();
//! if let Err(e) = cli::execute(args) {
//!     eprintln!("Error: {e:#}");
//! }
//! ```

pub mod cli;
pub mod config;
pub mod device;
pub mod domain;
pub mod error;
pub mod host;
pub mod registry;
pub mod wire;

pub use error::{Error, Result};
