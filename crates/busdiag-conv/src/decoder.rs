//! Payload decoders

use std::fmt;

use serde::Serialize;

use crate::error::{ConvError, ConvResult};

/// Widest integer a uint decoder can produce
pub const MAX_UINT_WIDTH: usize = 8;

/// How a DID payload is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decoder", rename_all = "lowercase")]
pub enum DidDecoder {
    /// Printable bytes as characters, everything else as `.`
    Ascii,
    /// Big-endian unsigned integer over the first `byte_count` bytes
    Uint { byte_count: usize },
    /// Space separated hex bytes
    Hex,
}

impl DidDecoder {
    pub fn uint(byte_count: usize) -> ConvResult<Self> {
        if byte_count == 0 || byte_count > MAX_UINT_WIDTH {
            return Err(ConvError::InvalidWidth(byte_count));
        }
        Ok(DidDecoder::Uint { byte_count })
    }

    /// Resolve a decoder from its file-format name
    pub fn from_name(name: &str, byte_count: usize) -> Option<ConvResult<Self>> {
        match name {
            "ascii" => Some(Ok(DidDecoder::Ascii)),
            "uint" => Some(Self::uint(byte_count)),
            "hex" => Some(Ok(DidDecoder::Hex)),
            _ => None,
        }
    }

    pub fn decode(&self, payload: &[u8]) -> String {
        match self {
            DidDecoder::Ascii => decode_ascii(payload),
            DidDecoder::Uint { byte_count } => decode_uint(payload, *byte_count),
            DidDecoder::Hex => raw_hex(payload),
        }
    }
}

impl fmt::Display for DidDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DidDecoder::Ascii => f.write_str("ascii"),
            DidDecoder::Uint { byte_count } => write!(f, "uint{}", byte_count * 8),
            DidDecoder::Hex => f.write_str("hex"),
        }
    }
}

pub fn decode_ascii(data: &[u8]) -> String {
    data.iter()
        .map(|&b| {
            if (0x20..=0x7E).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Short payloads render as `Invalid (<n> bytes)`
pub fn decode_uint(data: &[u8], byte_count: usize) -> String {
    if data.len() < byte_count {
        return format!("Invalid ({} bytes)", data.len());
    }
    data[..byte_count]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
        .to_string()
}

/// Fallback rendering for unknown DIDs and unknown decoders
pub fn raw_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ascii_replaces_unprintable() {
        assert_eq!(decode_ascii(b"VIN\x00\x7F~ "), "VIN..~ ");
        assert_eq!(decode_ascii(&[]), "");
    }

    #[test]
    fn test_uint_big_endian() {
        assert_eq!(decode_uint(&[0x00, 0x01, 0x86, 0xA0], 4), "100000");
        assert_eq!(decode_uint(&[0x01, 0x02, 0xFF], 2), "258");
        assert_eq!(decode_uint(&[0xFF; 8], 8), u64::MAX.to_string());
    }

    #[test]
    fn test_uint_short_payload() {
        assert_eq!(decode_uint(&[0x01, 0x02], 4), "Invalid (2 bytes)");
    }

    #[test]
    fn test_uint_width_bounds() {
        assert!(DidDecoder::uint(0).is_err());
        assert!(DidDecoder::uint(9).is_err());
        assert_eq!(DidDecoder::uint(2).unwrap().to_string(), "uint16");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(DidDecoder::from_name("ascii", 4).unwrap().unwrap(), DidDecoder::Ascii);
        assert_eq!(
            DidDecoder::from_name("uint", 2).unwrap().unwrap(),
            DidDecoder::Uint { byte_count: 2 }
        );
        assert_eq!(DidDecoder::from_name("hex", 4).unwrap().unwrap(), DidDecoder::Hex);
        assert!(DidDecoder::from_name("float", 4).is_none());
    }

    #[test]
    fn test_raw_hex() {
        assert_eq!(raw_hex(&[0x0A, 0xFF]), "0A FF");
    }
}
