//! Dump post-processing.
//!
//! Raw dumps are flat byte sequences of `page_size + spare_size` records in
//! page-index order. Stripping removes the spare areas; merging puts
//! externally preserved spare data back.

use crate::domain::chip::ChipDescriptor;

/// Remove the OOB area from every page of a raw dump.
///
/// Only applies when the dump length is an exact multiple of the raw page
/// size; anything else is returned unchanged, because guessing page
/// boundaries in a short or padded dump would corrupt it.
pub fn strip_oob(dump: &[u8], desc: &ChipDescriptor) -> Vec<u8> {
    let raw_page = desc.raw_page_size() as usize;
    let page = desc.page_size as usize;
    if desc.spare_size == 0 || raw_page == 0 || dump.len() % raw_page != 0 {
        return dump.to_vec();
    }
    let mut out = Vec::with_capacity(dump.len() / raw_page * page);
    for record in dump.chunks_exact(raw_page) {
        out.extend_from_slice(&record[..page]);
    }
    out
}

/// Extract only the OOB areas of a raw dump, in page order.
///
/// Returns `None` when the dump is not a whole number of raw pages.
pub fn extract_oob(dump: &[u8], desc: &ChipDescriptor) -> Option<Vec<u8>> {
    let raw_page = desc.raw_page_size() as usize;
    if raw_page == 0 || dump.len() % raw_page != 0 {
        return None;
    }
    let page = desc.page_size as usize;
    let mut out = Vec::with_capacity(dump.len() / raw_page * desc.spare_size as usize);
    for record in dump.chunks_exact(raw_page) {
        out.extend_from_slice(&record[page..]);
    }
    Some(out)
}

/// Rebuild a raw dump from stripped main data and separately kept OOB data.
///
/// Returns `None` when the two inputs do not describe the same number of
/// pages.
pub fn merge_oob(main: &[u8], oob: &[u8], desc: &ChipDescriptor) -> Option<Vec<u8>> {
    let page = desc.page_size as usize;
    let spare = desc.spare_size as usize;
    if page == 0 || main.len() % page != 0 {
        return None;
    }
    let pages = main.len() / page;
    if spare == 0 || oob.len() != pages * spare {
        return None;
    }
    let mut out = Vec::with_capacity(main.len() + oob.len());
    for i in 0..pages {
        out.extend_from_slice(&main[i * page..(i + 1) * page]);
        out.extend_from_slice(&oob[i * spare..(i + 1) * spare]);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: ChipDescriptor =
        ChipDescriptor::nand("Test", "T64", &[0x00, 0x01], 512, 32, 4);

    fn raw_dump(pages: usize) -> Vec<u8> {
        let raw = DESC.raw_page_size() as usize;
        let mut dump = Vec::with_capacity(pages * raw);
        for p in 0..pages {
            dump.extend((0..raw).map(|i| ((p * 7 + i) % 251) as u8));
        }
        dump
    }

    #[test]
    fn test_strip_oob_exact_multiple() {
        let dump = raw_dump(3);
        let stripped = strip_oob(&dump, &DESC);
        assert_eq!(stripped.len(), 3 * 512);
        assert_eq!(&stripped[..512], &dump[..512]);
        assert_eq!(&stripped[512..1024], &dump[528..1040]);
    }

    #[test]
    fn test_strip_oob_non_multiple_unchanged() {
        let mut dump = raw_dump(2);
        dump.pop();
        assert_eq!(strip_oob(&dump, &DESC), dump);
    }

    #[test]
    fn test_strip_then_merge_roundtrip() {
        let dump = raw_dump(4);
        let main = strip_oob(&dump, &DESC);
        let oob = extract_oob(&dump, &DESC).unwrap();
        assert_eq!(merge_oob(&main, &oob, &DESC).unwrap(), dump);
    }

    #[test]
    fn test_merge_rejects_page_count_mismatch() {
        let dump = raw_dump(2);
        let main = strip_oob(&dump, &DESC);
        let oob = extract_oob(&dump, &DESC).unwrap();
        assert!(merge_oob(&main[..512], &oob, &DESC).is_none());
        assert!(merge_oob(&main, &oob[..16], &DESC).is_none());
    }
}
