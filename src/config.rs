//! Application configuration.
//!
//! Persisted as JSON under `~/.piconand/`; every field has a default so a
//! missing or partial file still yields a working configuration.

use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::ecc::{EccConfig, EccScheme};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial link rate.
    pub default_baudrate: u32,
    /// Framed binary transport; legacy ASCII lines when false.
    pub use_binary_protocol: bool,
    /// Keep OOB areas in dumps and expect them in write images.
    pub include_oob: bool,
    /// Byte the device fills the spare area with on OOB-less writes.
    /// Some NAND families want 0xFF here instead.
    pub spare_fill: u8,
    /// WRITE streaming unit in bytes.
    pub chunk_size: usize,
    /// Verify page ECC after a successful read.
    pub enable_ecc: bool,
    pub ecc_scheme: EccScheme,
    pub ecc_sector_size: u32,
    pub ecc_bytes_per_sector: u32,
    pub ecc_oob_offset: u32,
    /// Single command/response exchanges.
    pub response_timeout_secs: u64,
    /// Inactivity window during a running operation.
    pub operation_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_baudrate: 921_600,
            use_binary_protocol: true,
            include_oob: false,
            spare_fill: 0x00,
            chunk_size: 4096,
            enable_ecc: false,
            ecc_scheme: EccScheme::Crc16,
            ecc_sector_size: 512,
            ecc_bytes_per_sector: 3,
            ecc_oob_offset: 0,
            response_timeout_secs: 10,
            operation_timeout_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults on a missing or malformed
    /// file.
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(config) => config,
                Err(e) => {
                    warn!("ignoring malformed config {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// The ECC knobs bundled for the verifier.
    pub fn ecc_config(&self) -> EccConfig {
        EccConfig {
            scheme: self.ecc_scheme,
            sector_size: self.ecc_sector_size,
            bytes_per_sector: self.ecc_bytes_per_sector,
            oob_offset: self.ecc_oob_offset,
        }
    }
}

/// `~/.piconand`, or the working directory when HOME is unset.
pub fn config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".piconand")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// The resume file lives beside the configuration.
pub fn default_resume_path() -> PathBuf {
    config_dir().join("resume.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.default_baudrate, 921_600);
        assert!(config.use_binary_protocol);
        assert!(!config.include_oob);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.spare_fill, 0x00);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config.chunk_size, AppConfig::default().chunk_size);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.include_oob = true;
        config.spare_fill = 0xFF;
        config.ecc_scheme = EccScheme::Hamming512;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert!(loaded.include_oob);
        assert_eq!(loaded.spare_fill, 0xFF);
        assert_eq!(loaded.ecc_scheme, EccScheme::Hamming512);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, br#"{ "include_oob": true }"#).unwrap();
        let config = AppConfig::load(&path);
        assert!(config.include_oob);
        assert_eq!(config.default_baudrate, 921_600);
    }
}
