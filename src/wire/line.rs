//! Legacy line-oriented protocol.
//!
//! Before the framed transport, the adapter spoke newline-terminated ASCII
//! tokens. The device still serves it for old hosts, and both transports use
//! the command tokens as the control channel (CANCEL/PAUSE/RESUME).

use std::fmt;

/// Commands the host sends to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Read,
    Write,
    WriteNoOob,
    Erase,
    Cancel,
    Pause,
    Resume,
    Exit,
    Redetect,
    Select(usize),
}

impl Command {
    /// Parse a trimmed command line.
    pub fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "STATUS" => Self::Status,
            "READ" => Self::Read,
            "WRITE" => Self::Write,
            "WRITE_NO_OOB" => Self::WriteNoOob,
            "ERASE" => Self::Erase,
            "CANCEL" => Self::Cancel,
            "PAUSE" => Self::Pause,
            "RESUME" => Self::Resume,
            "EXIT" => Self::Exit,
            "REDETECT" => Self::Redetect,
            _ => {
                let n: usize = line.strip_prefix("SELECT:")?.parse().ok()?;
                Self::Select(n)
            }
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "STATUS"),
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
            Self::WriteNoOob => write!(f, "WRITE_NO_OOB"),
            Self::Erase => write!(f, "ERASE"),
            Self::Cancel => write!(f, "CANCEL"),
            Self::Pause => write!(f, "PAUSE"),
            Self::Resume => write!(f, "RESUME"),
            Self::Exit => write!(f, "EXIT"),
            Self::Redetect => write!(f, "REDETECT"),
            Self::Select(n) => write!(f, "SELECT:{n}"),
        }
    }
}

/// Events the adapter sends to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Progress(u8),
    Model(String),
    OperationComplete,
    OperationFailed,
    OperationCancelled,
    ReadyForData,
    PowerWarning(String),
    Paused,
    NandNotConnected,
    ManualSelectStart,
    ManualSelectEnd,
    /// One `index:name` row of the manual-selection listing (1-based).
    ManualSelectEntry(usize, String),
    /// Informational text the host tolerates but does not interpret.
    Info(String),
}

impl Event {
    /// Parse a trimmed event line. Never fails: unrecognised lines become
    /// [`Event::Info`].
    pub fn parse(line: &str) -> Self {
        match line {
            "OPERATION_COMPLETE" => return Self::OperationComplete,
            "OPERATION_FAILED" => return Self::OperationFailed,
            "OPERATION_CANCELLED" => return Self::OperationCancelled,
            "READY_FOR_DATA" => return Self::ReadyForData,
            "PAUSED" => return Self::Paused,
            "NAND_NOT_CONNECTED" => return Self::NandNotConnected,
            "MANUAL_SELECT_START" => return Self::ManualSelectStart,
            "MANUAL_SELECT_END" => return Self::ManualSelectEnd,
            _ => {}
        }
        if let Some(rest) = line.strip_prefix("PROGRESS:") {
            if let Ok(pct) = rest.parse::<u8>() {
                return Self::Progress(pct.min(100));
            }
        }
        if let Some(rest) = line.strip_prefix("MODEL:") {
            return Self::Model(rest.to_string());
        }
        if let Some(rest) = line.strip_prefix("POWER_WARNING:") {
            return Self::PowerWarning(rest.to_string());
        }
        if let Some((idx, name)) = line.split_once(':') {
            if let Ok(idx) = idx.parse::<usize>() {
                return Self::ManualSelectEntry(idx, name.to_string());
            }
        }
        Self::Info(line.to_string())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress(pct) => write!(f, "PROGRESS:{pct}"),
            Self::Model(name) => write!(f, "MODEL:{name}"),
            Self::OperationComplete => write!(f, "OPERATION_COMPLETE"),
            Self::OperationFailed => write!(f, "OPERATION_FAILED"),
            Self::OperationCancelled => write!(f, "OPERATION_CANCELLED"),
            Self::ReadyForData => write!(f, "READY_FOR_DATA"),
            Self::PowerWarning(msg) => write!(f, "POWER_WARNING:{msg}"),
            Self::Paused => write!(f, "PAUSED"),
            Self::NandNotConnected => write!(f, "NAND_NOT_CONNECTED"),
            Self::ManualSelectStart => write!(f, "MANUAL_SELECT_START"),
            Self::ManualSelectEnd => write!(f, "MANUAL_SELECT_END"),
            Self::ManualSelectEntry(idx, name) => write!(f, "{idx}:{name}"),
            Self::Info(text) => write!(f, "{text}"),
        }
    }
}
