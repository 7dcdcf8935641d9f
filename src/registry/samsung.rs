//! Samsung NAND chips

use crate::domain::chip::ChipDescriptor;

pub(super) static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor::nand("Samsung", "K9F4G08U0A", &[0xEC, 0xD3], 2048, 128, 4096),
    ChipDescriptor::nand("Samsung", "K9F1G08U0A", &[0xEC, 0xF1], 2048, 128, 2048),
    ChipDescriptor::nand("Samsung", "K9F1G08R0A", &[0xEC, 0xF1], 2048, 64, 2048),
    ChipDescriptor::nand("Samsung", "K9GAG08U0M", &[0xEC, 0xD5], 4096, 256, 8192),
    ChipDescriptor::nand("Samsung", "K9T1G08U0M", &[0xEC, 0xF1], 2048, 128, 1024),
    ChipDescriptor::nand("Samsung", "K9F2G08U0M", &[0xEC, 0xDA], 2048, 128, 2048),
];
