//! Software ECC verification for raw page dumps.
//!
//! Two schemes are supported, both detection-only: a pragmatic whole-page
//! CRC16 check against two OOB bytes, and the conventional single-error
//! Hamming code storing three bytes per 512-byte sector. No correction is
//! applied; the verifier only names the sectors that disagree.

use serde::{Deserialize, Serialize};

use crate::wire::crc::crc16_ccitt;

/// ECC scheme stored in the OOB area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EccScheme {
    None,
    #[default]
    Crc16,
    #[serde(rename = "hamming_512_3byte")]
    Hamming512,
}

/// Where and how ECC bytes live in the OOB area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EccConfig {
    pub scheme: EccScheme,
    pub sector_size: u32,
    pub bytes_per_sector: u32,
    /// Offset within the OOB where the first sector's ECC bytes start.
    pub oob_offset: u32,
}

impl Default for EccConfig {
    fn default() -> Self {
        Self {
            scheme: EccScheme::Crc16,
            sector_size: 512,
            bytes_per_sector: 3,
            oob_offset: 0,
        }
    }
}

/// Sentinel meaning "whole page failed" rather than a specific sector.
pub const WHOLE_PAGE: i32 = -1;

/// Verify one page's main data against the ECC bytes in its spare area.
///
/// Returns the zero-based indices of mismatching sectors, `[WHOLE_PAGE]` for
/// a CRC16 mismatch, or an empty list when everything checks out (including
/// when the OOB simply does not carry enough bytes to check).
pub fn verify_page(main: &[u8], spare: &[u8], config: &EccConfig) -> Vec<i32> {
    match config.scheme {
        EccScheme::None => Vec::new(),
        EccScheme::Crc16 => {
            let offset = config.oob_offset as usize;
            if spare.len() < offset + 2 {
                return Vec::new();
            }
            let stored = u16::from_le_bytes([spare[offset], spare[offset + 1]]);
            if crc16_ccitt(main) != stored {
                vec![WHOLE_PAGE]
            } else {
                Vec::new()
            }
        }
        EccScheme::Hamming512 => {
            let sector_size = config.sector_size as usize;
            let bytes_per_sector = config.bytes_per_sector as usize;
            if sector_size == 0 || bytes_per_sector == 0 {
                return Vec::new();
            }
            let mut errors = Vec::new();
            for sector in 0..main.len() / sector_size {
                let start = config.oob_offset as usize + sector * bytes_per_sector;
                let end = start + bytes_per_sector;
                if end > spare.len() {
                    // OOB runs out before this sector; nothing to check.
                    continue;
                }
                let stored = &spare[start..end];
                let calc =
                    hamming_512_3byte(&main[sector * sector_size..(sector + 1) * sector_size]);
                if stored.len() < 3 || stored[..3] != calc {
                    errors.push(sector as i32);
                }
            }
            errors
        }
    }
}

/// Compute the 3-byte Hamming ECC for a 512-byte sector.
///
/// Row/column parities are accumulated over the sector viewed as 64
/// little-endian 32-bit words, folded to bytes, packed into 24 code bits,
/// and inverted so a blank (all-0xFF) sector stores `FF FF FF`. Input
/// shorter than 512 bytes is zero-padded.
pub fn hamming_512_3byte(sector: &[u8]) -> [u8; 3] {
    let mut data = [0u8; 512];
    let n = sector.len().min(512);
    data[..n].copy_from_slice(&sector[..n]);

    let mut rp = [0u32; 16];
    let mut par: u32 = 0;
    for (i, word) in data.chunks_exact(4).enumerate() {
        let cur = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        par ^= cur;
        // Distribute each word by the bits of its index.
        if i & 0x01 != 0 { rp[5] ^= cur } else { rp[4] ^= cur }
        if i & 0x02 != 0 { rp[7] ^= cur } else { rp[6] ^= cur }
        if i & 0x04 != 0 { rp[9] ^= cur } else { rp[8] ^= cur }
        if i & 0x08 != 0 { rp[11] ^= cur } else { rp[10] ^= cur }
        if i & 0x10 != 0 { rp[13] ^= cur } else { rp[12] ^= cur }
        if i & 0x20 != 0 { rp[15] ^= cur } else { rp[14] ^= cur }
    }

    // Fold the 32-bit accumulators down to bytes.
    for acc in rp.iter_mut().skip(4) {
        let mut v = *acc;
        v ^= v >> 16;
        v ^= v >> 8;
        *acc = v & 0xFF;
    }

    // rp0..rp3 derive from the overall column parity word.
    rp[3] = par >> 16;
    rp[3] ^= rp[3] >> 8;
    rp[3] &= 0xFF;
    rp[2] = par & 0xFFFF;
    rp[2] ^= rp[2] >> 8;
    rp[2] &= 0xFF;
    par ^= par >> 16;
    rp[1] = (par >> 8) & 0xFF;
    rp[0] = par & 0xFF;
    par ^= par >> 8;
    par &= 0xFF;

    let parity = |v: u32| (v.count_ones() & 1) as u8;

    let c0 = (parity(rp[7]) << 7)
        | (parity(rp[6]) << 6)
        | (parity(rp[5]) << 5)
        | (parity(rp[4]) << 4)
        | (parity(rp[3]) << 3)
        | (parity(rp[2]) << 2)
        | (parity(rp[1]) << 1)
        | parity(rp[0]);
    let c1 = (parity(rp[15]) << 7)
        | (parity(rp[14]) << 6)
        | (parity(rp[13]) << 5)
        | (parity(rp[12]) << 4)
        | (parity(rp[11]) << 3)
        | (parity(rp[10]) << 2)
        | (parity(rp[9]) << 1)
        | parity(rp[8]);
    let c2 = (parity(par & 0xF0) << 7)
        | (parity(par & 0x0F) << 6)
        | (parity(par & 0xCC) << 5)
        | (parity(par & 0x33) << 4)
        | (parity(par & 0xAA) << 3)
        | (parity(par & 0x55) << 2);

    [c0 ^ 0xFF, c1 ^ 0xFF, c2 ^ 0xFF]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_blank_sector_is_all_ff() {
        assert_eq!(hamming_512_3byte(&[0xFF; 512]), [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_hamming_short_input_zero_padded() {
        assert_eq!(hamming_512_3byte(&[]), hamming_512_3byte(&[0x00; 512]));
    }

    #[test]
    fn test_hamming_detects_single_byte_flip() {
        let blank = hamming_512_3byte(&[0xFF; 512]);
        let mut flipped = [0xFF; 512];
        flipped[100] = 0x7F;
        assert_ne!(hamming_512_3byte(&flipped), blank);
    }

    #[test]
    fn test_hamming_position_sensitive() {
        let mut a = [0xFF; 512];
        let mut b = [0xFF; 512];
        a[0] = 0x00;
        b[511] = 0x00;
        assert_ne!(hamming_512_3byte(&a), hamming_512_3byte(&b));
    }

    fn hamming_config() -> EccConfig {
        EccConfig {
            scheme: EccScheme::Hamming512,
            sector_size: 512,
            bytes_per_sector: 3,
            oob_offset: 0,
        }
    }

    #[test]
    fn test_verify_hamming_clean_page() {
        let main = [0xFF; 2048];
        let mut spare = vec![0xFF; 64];
        for sector in 0..4 {
            let ecc = hamming_512_3byte(&main[sector * 512..(sector + 1) * 512]);
            spare[sector * 3..sector * 3 + 3].copy_from_slice(&ecc);
        }
        assert!(verify_page(&main, &spare, &hamming_config()).is_empty());
    }

    #[test]
    fn test_verify_hamming_names_bad_sectors() {
        let mut main = [0xFF; 2048];
        let mut spare = vec![0xFF; 64];
        for sector in 0..4 {
            let ecc = hamming_512_3byte(&main[sector * 512..(sector + 1) * 512]);
            spare[sector * 3..sector * 3 + 3].copy_from_slice(&ecc);
        }
        main[512] = 0x00; // corrupt sector 1
        main[1600] = 0x12; // corrupt sector 3
        assert_eq!(verify_page(&main, &spare, &hamming_config()), vec![1, 3]);
    }

    #[test]
    fn test_verify_hamming_skips_sectors_beyond_oob() {
        let main = [0x00; 2048];
        // Only room for two sectors of ECC bytes
        let spare = vec![0x00; 6];
        let report = verify_page(&main, &spare, &hamming_config());
        // Sectors 2 and 3 are unverifiable and skipped, 0 and 1 mismatch
        assert_eq!(report, vec![0, 1]);
    }

    #[test]
    fn test_verify_crc16_match_and_mismatch() {
        let main = [0xAB; 2048];
        let crc = crc16_ccitt(&main);
        let mut spare = vec![0xFF; 64];
        spare[0..2].copy_from_slice(&crc.to_le_bytes());

        let config = EccConfig {
            scheme: EccScheme::Crc16,
            ..EccConfig::default()
        };
        assert!(verify_page(&main, &spare, &config).is_empty());

        spare[0] ^= 0x01;
        assert_eq!(verify_page(&main, &spare, &config), vec![WHOLE_PAGE]);
    }

    #[test]
    fn test_verify_crc16_ff_page_against_unset_oob() {
        // An all-0xFF page only passes when its CRC happens to be stored;
        // blank OOB (0xFF 0xFF) is a mismatch.
        let main = [0xFF; 2048];
        let spare = vec![0xFF; 64];
        let config = EccConfig {
            scheme: EccScheme::Crc16,
            ..EccConfig::default()
        };
        assert_eq!(verify_page(&main, &spare, &config), vec![WHOLE_PAGE]);
    }

    #[test]
    fn test_verify_crc16_short_oob_is_unchecked() {
        let main = [0xAB; 2048];
        let config = EccConfig {
            scheme: EccScheme::Crc16,
            ..EccConfig::default()
        };
        assert!(verify_page(&main, &[0xFF], &config).is_empty());
    }

    #[test]
    fn test_verify_none_scheme() {
        let config = EccConfig {
            scheme: EccScheme::None,
            ..EccConfig::default()
        };
        assert!(verify_page(&[0u8; 512], &[], &config).is_empty());
    }
}
