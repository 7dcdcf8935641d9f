//! Static registry of supported NAND chips.
//!
//! One module per manufacturer; extending support means appending an entry
//! at build time. Identification is a prefix match over the leading ID
//! bytes, in declaration order — several Samsung parts share `EC F1`, and the
//! first listed wins, exactly like the adapter firmware this replaces.

mod hynix;
mod intel;
mod micron;
mod samsung;
mod sandisk;
mod simulator;
mod toshiba;

use crate::domain::chip::ChipDescriptor;

pub use simulator::SIM_CHIP;

/// All supported chips, in lookup order.
pub fn all() -> impl Iterator<Item = &'static ChipDescriptor> {
    samsung::CHIPS
        .iter()
        .chain(hynix::CHIPS)
        .chain(toshiba::CHIPS)
        .chain(micron::CHIPS)
        .chain(intel::CHIPS)
        .chain(sandisk::CHIPS)
        .chain(simulator::CHIPS)
}

/// Identify a chip from the bytes returned by READ ID.
pub fn lookup(id: &[u8]) -> Option<&'static ChipDescriptor> {
    all().find(|chip| id.starts_with(chip.id_prefix))
}

/// Map a MODEL payload ("Manufacturer Name") back to its descriptor.
pub fn by_full_name(name: &str) -> Option<&'static ChipDescriptor> {
    all().find(|chip| chip.full_name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_descriptor_is_well_formed() {
        for chip in all() {
            assert!(
                (2..=5).contains(&chip.id_prefix.len()),
                "{}: bad id prefix",
                chip.name
            );
            assert!(
                matches!(chip.page_size, 512 | 2048 | 4096),
                "{}: bad page size",
                chip.name
            );
            assert!(
                matches!(chip.pages_per_block, 32 | 64 | 128 | 256),
                "{}: bad pages/block",
                chip.name
            );
            assert!(chip.block_count > 0, "{}: no blocks", chip.name);
            assert_eq!(
                chip.total_size(),
                chip.page_size as u64 * chip.pages_per_block as u64 * chip.block_count as u64,
                "{}: geometry invariant broken",
                chip.name
            );
        }
    }

    #[test]
    fn test_lookup_prefix_match() {
        let chip = lookup(&[0xEC, 0xF1, 0x80, 0x15]).unwrap();
        // Three Samsung parts share EC F1; the first listed wins
        assert_eq!(chip.name, "K9F1G08U0A");
    }

    #[test]
    fn test_lookup_needs_full_prefix() {
        assert!(lookup(&[0xEC]).is_none());
    }

    #[test]
    fn test_lookup_sentinel_id_fails() {
        // The all-0xFF ID the bus driver returns on timeout must never match
        assert!(lookup(&[0xFF, 0xFF, 0xFF, 0xFF]).is_none());
    }

    #[test]
    fn test_by_full_name() {
        let chip = by_full_name("Samsung K9F1G08U0A").unwrap();
        assert_eq!(chip.page_size, 2048);
        assert_eq!(chip.pages_per_block, 128);
        assert_eq!(chip.block_count, 2048);
        assert!(by_full_name("Acme NANDZilla").is_none());
    }

    #[test]
    fn test_registry_covers_all_vendors() {
        let vendors: std::collections::BTreeSet<&str> =
            all().map(|c| c.manufacturer).collect();
        for vendor in ["Samsung", "Hynix", "Toshiba", "Micron", "Intel", "SanDisk"] {
            assert!(vendors.contains(vendor), "missing {vendor}");
        }
    }
}
