use std::io;
use thiserror::Error;

/// The primary error type for the `iox-lib` library.
#[derive(Error, Debug)]
pub enum IoxError {
    #[error("framing error: {0}")]
    Framing(String),

    #[error("checksum mismatch: expected {expected:02x?}, got {actual:02x?}")]
    ChecksumMismatch { expected: [u8; 2], actual: [u8; 2] },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("client already started")]
    AlreadyStarted,

    #[error("telemetry payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },
}

/// Coarse error classification used by callers that only branch on the
/// failure class, not the specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed wire data: bad markers, truncated or oversized frame,
    /// checksum mismatch
    Framing,
    /// Failure of the underlying link: open, write, unexpected close
    Transport,
    /// Structurally valid frame whose payload is too short for the
    /// telemetry record
    Decode,
}

impl IoxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IoxError::Framing(_) | IoxError::ChecksumMismatch { .. } => ErrorKind::Framing,
            IoxError::Transport(_) | IoxError::Io(_) | IoxError::AlreadyStarted => {
                ErrorKind::Transport
            }
            IoxError::PayloadTooShort { .. } => ErrorKind::Decode,
        }
    }
}
