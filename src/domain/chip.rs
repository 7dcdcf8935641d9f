//! NAND chip descriptors.
//!
//! A descriptor is a closed product type owned by the registry; the bus
//! driver and both engines are parameterized by its values, never subclassed.

use std::fmt;

/// Interface timing parameters in nanoseconds. Advisory: slow adapters meet
/// them for free, fast ones insert waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandTimings {
    /// Write cycle time
    pub t_wc: u32,
    /// Read cycle time
    pub t_rc: u32,
    /// RE# access time
    pub t_rea: u32,
    /// RE# pulse width
    pub t_rp: u32,
    /// WE# pulse width
    pub t_wp: u32,
}

impl NandTimings {
    /// Conservative defaults that every supported part meets.
    pub const fn conservative() -> Self {
        Self {
            t_wc: 25,
            t_rc: 25,
            t_rea: 15,
            t_rp: 12,
            t_wp: 12,
        }
    }
}

impl Default for NandTimings {
    fn default() -> Self {
        Self::conservative()
    }
}

/// Static description of one supported NAND part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipDescriptor {
    pub manufacturer: &'static str,
    pub name: &'static str,
    /// Leading ID bytes used for prefix-match identification (2..=5 bytes).
    pub id_prefix: &'static [u8],
    /// Main data bytes per page.
    pub page_size: u32,
    /// OOB bytes per page.
    pub spare_size: u32,
    pub pages_per_block: u32,
    pub block_count: u32,
    pub timings: NandTimings,
}

impl ChipDescriptor {
    /// Descriptor with the spare size derived from the page size
    /// (512 → 16, 2048 → 64, 4096 → 128) and conservative timings.
    pub const fn nand(
        manufacturer: &'static str,
        name: &'static str,
        id_prefix: &'static [u8],
        page_size: u32,
        pages_per_block: u32,
        block_count: u32,
    ) -> Self {
        Self {
            manufacturer,
            name,
            id_prefix,
            page_size,
            spare_size: derived_spare_size(page_size),
            pages_per_block,
            block_count,
            timings: NandTimings::conservative(),
        }
    }

    /// Main + spare bytes, the unit a raw dump is made of.
    pub fn raw_page_size(&self) -> u32 {
        self.page_size + self.spare_size
    }

    pub fn total_pages(&self) -> u32 {
        self.pages_per_block * self.block_count
    }

    /// Main-data capacity in bytes (excludes spare).
    pub fn total_size(&self) -> u64 {
        self.page_size as u64 * self.pages_per_block as u64 * self.block_count as u64
    }

    /// Raw capacity including spare areas.
    pub fn total_raw_size(&self) -> u64 {
        self.raw_page_size() as u64 * self.total_pages() as u64
    }

    /// Address cycles the part needs, derived from the page count.
    pub fn address_cycles(&self) -> u8 {
        if self.total_pages() <= 65_536 {
            4
        } else {
            5
        }
    }

    /// "Manufacturer Name", the identity used on the wire in MODEL frames.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.manufacturer, self.name)
    }
}

impl fmt::Display for ChipDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mb = self.total_size() / (1024 * 1024);
        write!(
            f,
            "{} {} ({} MB, {}+{} B pages, {} pages/block, {} blocks)",
            self.manufacturer,
            self.name,
            mb,
            self.page_size,
            self.spare_size,
            self.pages_per_block,
            self.block_count
        )
    }
}

/// Conventional spare size for a page size.
pub const fn derived_spare_size(page_size: u32) -> u32 {
    match page_size {
        512 => 16,
        4096 => 128,
        _ => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: ChipDescriptor =
        ChipDescriptor::nand("Samsung", "K9F1G08U0A", &[0xEC, 0xF1], 2048, 128, 2048);

    #[test]
    fn test_geometry_derivations() {
        assert_eq!(SAMPLE.spare_size, 64);
        assert_eq!(SAMPLE.raw_page_size(), 2112);
        assert_eq!(SAMPLE.total_pages(), 128 * 2048);
        assert_eq!(SAMPLE.total_size(), 2048u64 * 128 * 2048);
        assert_eq!(
            SAMPLE.total_raw_size(),
            2112u64 * 128 * 2048
        );
    }

    #[test]
    fn test_address_cycles_by_page_count() {
        // 256Ki pages needs 5 cycles
        assert_eq!(SAMPLE.address_cycles(), 5);

        let small = ChipDescriptor::nand("Test", "Tiny", &[0x00, 0x01], 512, 32, 1024);
        assert_eq!(small.total_pages(), 32 * 1024);
        assert_eq!(small.address_cycles(), 4);
    }

    #[test]
    fn test_spare_size_table() {
        assert_eq!(derived_spare_size(512), 16);
        assert_eq!(derived_spare_size(2048), 64);
        assert_eq!(derived_spare_size(4096), 128);
    }

    #[test]
    fn test_full_name() {
        assert_eq!(SAMPLE.full_name(), "Samsung K9F1G08U0A");
    }
}
