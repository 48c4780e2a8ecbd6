//! Diagnostic request errors

use thiserror::Error;

use super::NegativeResponseCode;
use crate::transport::{ErrorKind, TransportError};

/// Failure of one diagnostic request, delivered to the caller that issued it
#[derive(Debug, Error, Clone)]
pub enum DiagError {
    #[error("No response within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Negative response: {nrc} (0x{nrc:02X}) for service 0x{service_id:02X}")]
    NegativeResponse {
        service_id: u8,
        nrc: NegativeResponseCode,
    },

    /// Key rejected; more attempts remain
    #[error("Security access denied ({attempts}/{limit} attempts)")]
    SecurityDenied { attempts: u32, limit: u32 },

    /// Attempt limit exceeded; only an ECU power cycle clears this
    #[error("Security access locked out")]
    LockedOut,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A newer request took the pending slot
    #[error("Request superseded by a newer request")]
    Superseded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl DiagError {
    /// Whether repeating the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DiagError::LockedOut | DiagError::InvalidArgument(_) => false,
            DiagError::NegativeResponse { nrc, .. } => {
                !matches!(nrc, NegativeResponseCode::ExceededNumberOfAttempts)
            }
            _ => true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DiagError::Timeout { .. } => ErrorKind::Timeout,
            DiagError::NegativeResponse { .. } => ErrorKind::NegativeResponse,
            DiagError::SecurityDenied { .. } => ErrorKind::SecurityDenied,
            DiagError::LockedOut => ErrorKind::LockedOut,
            DiagError::Transport(TransportError::Open(_)) => ErrorKind::Open,
            DiagError::InvalidResponse(_) => ErrorKind::Decode,
            _ => ErrorKind::Io,
        }
    }
}

pub type DiagResult<T> = Result<T, DiagError>;
