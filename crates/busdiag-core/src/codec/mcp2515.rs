//! Text protocol of MCP2515 microcontroller sketches
//!
//! Sketches differ in what they print, so three receive shapes are tried
//! in order and the first match wins:
//!
//! 1. `ID:7E8,LEN:2,DATA:50,03` (data may also be space separated)
//! 2. `7E8#50.03` (candump style)
//! 3. `7E8 2 50 03` or `7E8 50 03` (a single-character second token is a length)

use std::sync::OnceLock;

use regex::Regex;

use super::{comma_hex, hex_bytes, hex_token, TxCommand};
use crate::error::DecodeError;
use crate::frame::{CanId, Direction, Frame, MAX_CLASSIC_PAYLOAD};

pub(super) const INIT_COMMAND: &[u8] = b"INIT\r\n";

fn fields_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^ID:([0-9A-Fa-f]+),LEN:(\d+),DATA:([0-9A-Fa-f,\s]+)").expect("valid regex")
    })
}

fn candump_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9A-Fa-f]+)#([0-9A-Fa-f.]+)").expect("valid regex"))
}

fn send_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^SEND:([0-9A-Fa-f]+),(\d+),([0-9A-Fa-f,]*)$").expect("valid regex")
    })
}

pub(super) fn decode(line: &str) -> Result<Frame, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::NotAFrame(String::new()));
    }

    if let Some(caps) = fields_shape().captures(line) {
        let id = parse_id(&caps[1])?;
        let digits: String = caps[3].chars().filter(|c| c.is_ascii_hexdigit()).collect();
        return build(id, hex_bytes(&digits)?);
    }

    if let Some(caps) = candump_shape().captures(line) {
        let id = parse_id(&caps[1])?;
        let digits = caps[2].replace('.', "");
        return build(id, hex_bytes(&digits)?);
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() >= 3 {
        let id = parse_id(parts[0])?;
        let tokens = if parts[1].len() == 1 {
            let len = parts[1]
                .parse::<usize>()
                .ok()
                .filter(|n| *n <= MAX_CLASSIC_PAYLOAD)
                .ok_or_else(|| DecodeError::InvalidLength(parts[1].to_string()))?;
            let available = &parts[2..];
            if available.len() < len {
                return Err(DecodeError::Truncated {
                    expected: len * 2,
                    actual: available.len() * 2,
                });
            }
            &available[..len]
        } else {
            &parts[1..]
        };
        let data = tokens
            .iter()
            .map(|t| hex_token(t))
            .collect::<Result<Vec<u8>, _>>()?;
        return build(id, data);
    }

    Err(DecodeError::Unrecognized(line.to_string()))
}

/// `SEND:<id>,<len>,<csv hex>\r\n`
pub(super) fn encode(id: CanId, data: &[u8]) -> Vec<u8> {
    format!("SEND:{},{},{}\r\n", id, data.len(), comma_hex(data)).into_bytes()
}

pub(super) fn format(frame: &Frame) -> String {
    format!(
        "ID:{},LEN:{},DATA:{}\r\n",
        frame.id(),
        frame.data().len(),
        comma_hex(frame.data())
    )
}

pub(super) fn parse_command(line: &str) -> Result<TxCommand, DecodeError> {
    let line = line.trim();
    if line == "INIT" {
        return Ok(TxCommand::Init);
    }
    let caps = send_shape()
        .captures(line)
        .ok_or_else(|| DecodeError::Unrecognized(line.to_string()))?;
    let id = parse_id(&caps[1])?;
    let data = if caps[3].is_empty() {
        Vec::new()
    } else {
        caps[3]
            .split(',')
            .map(hex_token)
            .collect::<Result<Vec<u8>, _>>()?
    };
    if caps[2].parse::<usize>().ok() != Some(data.len()) {
        return Err(DecodeError::InvalidLength(caps[2].to_string()));
    }
    Ok(TxCommand::Frame { id, data })
}

fn parse_id(text: &str) -> Result<CanId, DecodeError> {
    CanId::parse(text).map_err(|_| DecodeError::InvalidHex(text.to_string()))
}

fn build(id: CanId, data: Vec<u8>) -> Result<Frame, DecodeError> {
    Ok(Frame::new(id, data, Direction::Rx)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fields_shape() {
        let frame = decode("ID:7E8,LEN:3,DATA:62,F1,90").unwrap();
        assert_eq!(frame.id().raw(), 0x7E8);
        assert_eq!(frame.data(), &[0x62, 0xF1, 0x90]);

        let frame = decode("ID:7e8,LEN:2,DATA:50 03").unwrap();
        assert_eq!(frame.data(), &[0x50, 0x03]);
    }

    #[test]
    fn test_candump_shape() {
        let frame = decode("18DAF110#62.F1.90").unwrap();
        assert!(frame.id().is_extended());
        assert_eq!(frame.data(), &[0x62, 0xF1, 0x90]);
    }

    #[test]
    fn test_token_shape_with_length() {
        let frame = decode("7E8 2 50 03 AA").unwrap();
        assert_eq!(frame.data(), &[0x50, 0x03]);
    }

    #[test]
    fn test_token_shape_without_length() {
        let frame = decode("7E8 50 03 AA").unwrap();
        assert_eq!(frame.data(), &[0x50, 0x03, 0xAA]);
    }

    #[test]
    fn test_first_shape_wins() {
        // also looks like three tokens, but the field shape matches first
        let frame = decode("ID:100,LEN:1,DATA:01 02 03").unwrap();
        assert_eq!(frame.id().raw(), 0x100);
        assert_eq!(frame.data(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_decode_failures() {
        assert_eq!(
            decode("hello"),
            Err(DecodeError::Unrecognized("hello".to_string()))
        );
        assert_eq!(
            decode("ID:7E8,LEN:1,DATA:5"),
            Err(DecodeError::OddHexDigits("5".to_string()))
        );
        assert_eq!(
            decode("7E8 4 50 03"),
            Err(DecodeError::Truncated {
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(
            decode("7E8 9 50 03"),
            Err(DecodeError::InvalidLength("9".to_string()))
        );
        assert!(decode("7E8 50 GG").is_err());
        assert!(decode("7E8#00.11.22.33.44.55.66.77.88").is_err());
    }

    #[test]
    fn test_encode_is_byte_exact() {
        let id = CanId::standard(0x7E0).unwrap();
        assert_eq!(encode(id, &[0x10, 0x03]), b"SEND:7E0,2,10,03\r\n".to_vec());
        assert_eq!(encode(id, &[]), b"SEND:7E0,0,\r\n".to_vec());
    }

    #[test]
    fn test_parse_command() {
        let cmd = parse_command("SEND:7E0,2,10,03").unwrap();
        assert_eq!(
            cmd,
            TxCommand::Frame {
                id: CanId::standard(0x7E0).unwrap(),
                data: vec![0x10, 0x03]
            }
        );
        assert_eq!(parse_command("INIT").unwrap(), TxCommand::Init);
        assert!(parse_command("SEND:7E0,3,10,03").is_err());
    }
}
