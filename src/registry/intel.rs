//! Intel NAND chips

use crate::domain::chip::ChipDescriptor;

pub(super) static CHIPS: &[ChipDescriptor] = &[
    ChipDescriptor::nand("Intel", "JS29F32G08AAMC1", &[0x89, 0xD3], 4096, 256, 8192),
    ChipDescriptor::nand("Intel", "JS29F64G08ACMF3", &[0x89, 0xD7], 4096, 256, 16384),
];
