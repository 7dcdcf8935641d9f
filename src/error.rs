//! Error types for piconand
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for piconand
#[derive(Error, Debug)]
pub enum Error {
    /// USB communication error
    #[error("USB error: {0}")]
    Usb(nusb::Error),

    /// USB transfer error
    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// No matching serial endpoint found
    #[error("Adapter not found. Is the Pico connected and enumerated as CDC serial?")]
    AdapterNotFound,

    /// The peer end of a link has gone away
    #[error("Serial link closed by peer")]
    LinkClosed,

    /// No response within the inactivity window
    #[error("Operation timed out")]
    Timeout,

    /// Device reported a chip model this build does not know
    #[error("Device reported unknown model: {0}")]
    UnknownModel(String),

    /// No chip attached / detected on the device side
    #[error("NAND chip not detected. Check connections and power.")]
    ChipNotDetected,

    /// The device terminated the operation with an error frame
    #[error("Device reported failure: {0}")]
    DeviceFailure(String),

    /// Operation cancelled by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// Resume state contradicts the incoming data stream
    #[error("Resume discard misaligned: {0}")]
    ResumeMisaligned(String),

    /// Operation not available on the current transport
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (config / resume state)
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
