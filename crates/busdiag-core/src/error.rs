//! Frame construction and line decoding errors

use thiserror::Error;

/// Errors raised when constructing frame values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLong { len: usize, max: usize },

    #[error("secondary-bus frame needs at least one data byte")]
    EmptyPayload,

    #[error("identifier 0x{id:X} out of range (max 0x{max:X})")]
    IdOutOfRange { id: u32, max: u32 },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("frame id 0x{0:02X} does not fit in 6 bits")]
    FrameIdOutOfRange(u8),

    #[error("protected id 0x{raw:02X} has wrong parity (expected 0x{expected:02X})")]
    ParityMismatch { raw: u8, expected: u8 },
}

/// Errors raised while decoding a single adapter line
///
/// A decode error never ends a stream: the line is logged and skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Adapter chatter that is not a frame (acks, bell, remote frames)
    #[error("not a frame: {0:?}")]
    NotAFrame(String),

    #[error("no line shape matched: {0:?}")]
    Unrecognized(String),

    #[error("line too short: {0:?}")]
    TooShort(String),

    #[error("invalid length field {0:?}")]
    InvalidLength(String),

    #[error("odd number of hex digits in {0:?}")]
    OddHexDigits(String),

    #[error("truncated data: expected {expected} hex digits, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unexpected trailing data: {0:?}")]
    TrailingData(String),

    #[error("invalid hex {0:?}")]
    InvalidHex(String),

    #[error("invalid direction {0:?}")]
    InvalidDirection(String),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl DecodeError {
    /// Whether the line was adapter chatter rather than a damaged frame
    pub fn is_chatter(&self) -> bool {
        matches!(self, DecodeError::NotAFrame(_))
    }
}
