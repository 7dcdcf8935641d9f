//! Toshiba NAND chips

use crate::domain::chip::ChipDescriptor;

pub(super) static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor::nand("Toshiba", "TC58NVG2S3E", &[0x98, 0xDA], 2048, 128, 2048),
    ChipDescriptor::nand("Toshiba", "TC58NVG3S0F", &[0x98, 0xF1], 4096, 256, 4096),
];
