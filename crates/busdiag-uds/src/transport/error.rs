//! Transport layer errors

use busdiag_core::FrameError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    /// Endpoint could not be opened
    #[error("Open failed: {0}")]
    Open(String),

    /// Mid-stream read or write failure
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Encode failed: {0}")]
    Encode(#[from] FrameError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
