//! SanDisk NAND chips

use crate::domain::chip::ChipDescriptor;

pub(super) static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor::nand("SanDisk", "SDTNQGAMA-008G", &[0x45, 0xD7], 4096, 256, 8192),
];
