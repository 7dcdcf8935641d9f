//! Hynix NAND chips

use crate::domain::chip::ChipDescriptor;

pub(super) static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor::nand("Hynix", "HY27US08281A", &[0xAD, 0xF1], 2048, 128, 1024),
    ChipDescriptor::nand("Hynix", "H27UBG8T2A", &[0xAD, 0xD3], 4096, 256, 8192),
    ChipDescriptor::nand("Hynix", "HY27UF082G2B", &[0xAD, 0xF1], 2048, 128, 2048),
    ChipDescriptor::nand("Hynix", "H27U4G8F2D", &[0xAD, 0xD5], 4096, 256, 4096),
    ChipDescriptor::nand("Hynix", "H27U4G8F2DTR", &[0xAD, 0xD5], 4096, 256, 4096),
];
