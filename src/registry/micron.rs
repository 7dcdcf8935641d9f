//! Micron NAND chips

use crate::domain::chip::ChipDescriptor;

pub(super) static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor::nand("Micron", "MT29F4G08ABA", &[0x2C, 0xDC], 4096, 256, 4096),
    ChipDescriptor::nand("Micron", "MT29F8G08ABACA", &[0x2C, 0x68], 4096, 256, 8192),
];
