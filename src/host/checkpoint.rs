//! On-disk resume checkpoints.
//!
//! One small JSON file next to the configuration records the last
//! acknowledged unit of a long operation. Writes are whole-file replacements
//! (temp file + rename); a missing or malformed file reads as "no
//! checkpoint", never as an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::domain::types::Operation;
use crate::error::Result;

/// Persisted progress of an interrupted operation.
///
/// The READ fields always come from one PAGE_CRC frame, so `page_crc32` is
/// the device's CRC of page `last_page`. The checkpoint is only written after
/// the described unit (page, chunk, block) has been acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation")]
pub enum ResumeCheckpoint {
    #[serde(rename = "READ")]
    Read {
        last_page: u32,
        page_crc32: u32,
        timestamp: u64,
    },
    #[serde(rename = "WRITE")]
    Write {
        bytes_sent: u64,
        chunk_crc32: u32,
        timestamp: u64,
    },
    #[serde(rename = "ERASE")]
    Erase { erase_block: u32, timestamp: u64 },
}

impl ResumeCheckpoint {
    pub fn read(last_page: u32, page_crc32: u32) -> Self {
        Self::Read {
            last_page,
            page_crc32,
            timestamp: epoch_seconds(),
        }
    }

    pub fn write(bytes_sent: u64, chunk_crc32: u32) -> Self {
        Self::Write {
            bytes_sent,
            chunk_crc32,
            timestamp: epoch_seconds(),
        }
    }

    pub fn erase(erase_block: u32) -> Self {
        Self::Erase {
            erase_block,
            timestamp: epoch_seconds(),
        }
    }

    /// Which operation this checkpoint belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            Self::Read { .. } => Operation::Read,
            Self::Write { .. } => Operation::Write,
            Self::Erase { .. } => Operation::Erase,
        }
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Whole-file-replacement store for one [`ResumeCheckpoint`].
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored checkpoint, if any. Malformed content is logged and
    /// treated as absent.
    pub fn load(&self) -> Option<ResumeCheckpoint> {
        let data = fs::read(&self.path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!("ignoring malformed resume file {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Atomically replace the stored checkpoint.
    pub fn save(&self, checkpoint: &ResumeCheckpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("checkpoint saved: {checkpoint:?}");
        Ok(())
    }

    /// Remove the checkpoint. Missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CheckpointStore {
        CheckpointStore::new(dir.path().join("resume.json"))
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let checkpoint = ResumeCheckpoint::read(42, 0xDEADBEEF);
        store.save(&checkpoint).unwrap();
        assert_eq!(store.load(), Some(checkpoint));

        let checkpoint = ResumeCheckpoint::write(1 << 20, 0x1234);
        store.save(&checkpoint).unwrap();
        assert_eq!(store.load(), Some(checkpoint));
    }

    #[test]
    fn test_missing_file_is_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load(), None);
    }

    #[test]
    fn test_malformed_file_is_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"{ not json").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_clear_removes_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&ResumeCheckpoint::erase(7)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_operation_tag_matches_wire_tokens() {
        let json = serde_json::to_string(&ResumeCheckpoint::erase(3)).unwrap();
        assert!(json.contains("\"operation\": \"ERASE\"") || json.contains("\"operation\":\"ERASE\""));
        assert_eq!(ResumeCheckpoint::erase(3).operation(), Operation::Erase);
    }
}
