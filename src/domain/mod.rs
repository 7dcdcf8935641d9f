//! Core domain types: chip geometry, ECC verification, dump post-processing.

pub mod bad_block;
pub mod chip;
pub mod dump;
pub mod ecc;
pub mod types;

pub use chip::{ChipDescriptor, NandTimings};
pub use ecc::{EccConfig, EccScheme};
pub use types::{Operation, Progress};
