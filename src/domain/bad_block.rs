//! Offline bad-block reporting.
//!
//! The factory marks a bad block by programming a non-0xFF value into spare
//! byte 0 of the block's first page. A raw dump (with OOB) carries those
//! marks, so the report can be derived without touching the chip again.

use crate::domain::chip::ChipDescriptor;

/// One flagged block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadBlock {
    pub block: u32,
    /// The spare byte 0 value that flagged it.
    pub marker: u8,
}

/// Scan a raw dump for factory bad-block marks.
///
/// The dump is split into `page_size + spare_size` records and
/// `pages_per_block` records per block; a trailing partial block is scanned
/// as far as its first page exists.
pub fn scan_dump(dump: &[u8], desc: &ChipDescriptor) -> Vec<BadBlock> {
    let raw_page = desc.raw_page_size() as usize;
    let page = desc.page_size as usize;
    if desc.spare_size == 0 || raw_page == 0 {
        return Vec::new();
    }
    let block_bytes = raw_page * desc.pages_per_block as usize;
    let mut report = Vec::new();
    let mut block = 0u32;
    let mut offset = 0usize;
    while offset + raw_page <= dump.len() {
        let marker = dump[offset + page];
        if marker != 0xFF {
            report.push(BadBlock { block, marker });
        }
        block += 1;
        offset += block_bytes;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: ChipDescriptor =
        ChipDescriptor::nand("Test", "T64", &[0x00, 0x01], 512, 4, 8);

    fn blank_dump(blocks: u32) -> Vec<u8> {
        vec![0xFF; (DESC.raw_page_size() * DESC.pages_per_block * blocks) as usize]
    }

    fn mark_block(dump: &mut [u8], block: u32, marker: u8) {
        let block_bytes = (DESC.raw_page_size() * DESC.pages_per_block) as usize;
        let offset = block as usize * block_bytes + DESC.page_size as usize;
        dump[offset] = marker;
    }

    #[test]
    fn test_clean_dump_has_no_bad_blocks() {
        assert!(scan_dump(&blank_dump(8), &DESC).is_empty());
    }

    #[test]
    fn test_marked_blocks_reported_in_order() {
        let mut dump = blank_dump(8);
        mark_block(&mut dump, 2, 0x00);
        mark_block(&mut dump, 5, 0xA5);
        let report = scan_dump(&dump, &DESC);
        assert_eq!(
            report,
            vec![
                BadBlock { block: 2, marker: 0x00 },
                BadBlock { block: 5, marker: 0xA5 },
            ]
        );
    }

    #[test]
    fn test_mark_elsewhere_in_block_ignored() {
        let mut dump = blank_dump(4);
        // Non-first-page spare byte does not flag the block
        let second_page = (DESC.raw_page_size() + DESC.page_size) as usize;
        dump[second_page] = 0x00;
        assert!(scan_dump(&dump, &DESC).is_empty());
    }

    #[test]
    fn test_truncated_dump_scans_available_blocks() {
        let mut dump = blank_dump(8);
        mark_block(&mut dump, 7, 0x00);
        dump.truncate(dump.len() - DESC.raw_page_size() as usize * 2);
        // Block 7's first page is still present
        assert_eq!(scan_dump(&dump, &DESC).len(), 1);
    }
}
