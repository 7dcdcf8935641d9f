//! Simulated chip used by the `sim` port and the test suite.
//!
//! Small on purpose (1 MiB of main data) so full-chip operations finish in
//! milliseconds. The ID prefix is outside every real manufacturer's range.

use crate::domain::chip::ChipDescriptor;

/// Descriptor the in-process simulator identifies as.
pub const SIM_CHIP: ChipDescriptor =
    ChipDescriptor::nand("Virtual", "SIMNAND-1M", &[0x5A, 0xA5], 512, 32, 64);

pub(super) static CHIPS: &[ChipDescriptor] = &[SIM_CHIP];
