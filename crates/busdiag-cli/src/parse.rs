//! Argument parsers for hex values and names

use anyhow::{bail, Context, Result};
use busdiag_core::Dialect;
use busdiag_uds::uds::session_type;

fn strip_hex_prefix(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

/// Parse a hex number with optional `0x` prefix
pub fn parse_hex_u32(text: &str) -> Result<u32, String> {
    u32::from_str_radix(strip_hex_prefix(text), 16).map_err(|e| format!("invalid hex '{text}': {e}"))
}

pub fn parse_hex_u16(text: &str) -> Result<u16, String> {
    u16::from_str_radix(strip_hex_prefix(text), 16).map_err(|e| format!("invalid hex '{text}': {e}"))
}

pub fn parse_hex_u8(text: &str) -> Result<u8, String> {
    u8::from_str_radix(strip_hex_prefix(text), 16).map_err(|e| format!("invalid hex '{text}': {e}"))
}

pub fn parse_dialect(text: &str) -> Result<Dialect, String> {
    text.parse()
}

/// Parse hex bytes, ignoring spaces, colons, dots and an `0x` prefix
///
/// `"27 01"`, `"2701"`, `"27:01"` and `"0x2701"` all give `[0x27, 0x01]`.
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let cleaned: String = strip_hex_prefix(text)
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '.' | ',' | '-'))
        .collect();
    hex::decode(&cleaned).with_context(|| format!("Invalid hex data '{}'", text))
}

/// Session type by name (`default`, `programming`, `extended`) or hex
pub fn parse_session_type(text: &str) -> Result<u8> {
    match text.to_lowercase().as_str() {
        "default" => Ok(session_type::DEFAULT),
        "programming" | "prog" => Ok(session_type::PROGRAMMING),
        "extended" | "ext" => Ok(session_type::EXTENDED),
        other => match parse_hex_u8(other) {
            Ok(0) => bail!("Session type 0x00 is reserved"),
            Ok(value) => Ok(value),
            Err(_) => bail!(
                "Unknown session type '{}' (use default, programming, extended or a hex value)",
                text
            ),
        },
    }
}
