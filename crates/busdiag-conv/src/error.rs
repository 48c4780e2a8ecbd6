//! Error types for DID tables

use thiserror::Error;

/// Errors that can occur while loading or applying a DID table
#[derive(Debug, Error)]
pub enum ConvError {
    /// Invalid DID string format
    #[error("invalid DID format: {0}")]
    InvalidDidFormat(String),

    /// Integer width outside 1..=8 bytes
    #[error("invalid integer width: {0} bytes")]
    InvalidWidth(usize),

    /// Response too short to carry a DID
    #[error("data too short: expected {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for DID table operations
pub type ConvResult<T> = Result<T, ConvError>;

/// Parse a DID string (hex) to u16
///
/// Accepts formats: "F190", "0xF190", "0XF190", "f190"
pub fn parse_did(s: &str) -> ConvResult<u16> {
    let s = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(s, 16).map_err(|_| ConvError::InvalidDidFormat(s.to_string()))
}

/// Format a DID as hex string (uppercase, no prefix)
pub fn format_did(did: u16) -> String {
    format!("{:04X}", did)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_did() {
        assert_eq!(parse_did("F190").unwrap(), 0xF190);
        assert_eq!(parse_did("0xF190").unwrap(), 0xF190);
        assert_eq!(parse_did("0XF190").unwrap(), 0xF190);
        assert_eq!(parse_did("f190").unwrap(), 0xF190);
        assert_eq!(parse_did("  F190  ").unwrap(), 0xF190);
        assert!(parse_did("invalid").is_err());
        assert!(parse_did("FFFFF").is_err());
    }

    #[test]
    fn test_format_did() {
        assert_eq!(format_did(0xF190), "F190");
        assert_eq!(format_did(0x0001), "0001");
    }
}
