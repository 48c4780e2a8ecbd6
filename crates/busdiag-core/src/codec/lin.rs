//! LIN bridge protocol
//!
//! Receive shapes: `PID:C1,DATA:00,FE,CKS:3F` or `LIN C1 00 FE 3F`.
//! The checksum is carried through untouched; verifying it is up to the
//! consumer (see [`LinFrame::checksum_valid`]).

use std::sync::OnceLock;

use regex::Regex;

use super::{comma_hex, hex_bytes, hex_token, TxCommand};
use crate::error::{DecodeError, FrameError};
use crate::frame::{Direction, LinFrame, ProtectedId};
use crate::lin::{calculate_checksum, ChecksumModel};

fn fields_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^PID:([0-9A-Fa-f]+),DATA:([0-9A-Fa-f,]+),CKS:([0-9A-Fa-f]+)")
            .expect("valid regex")
    })
}

fn send_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^LIN:([0-9A-Fa-f]{1,2}),([0-9A-Fa-f,]+),([0-9A-Fa-f]{1,2})$")
            .expect("valid regex")
    })
}

pub(super) fn decode(line: &str) -> Result<LinFrame, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::NotAFrame(String::new()));
    }

    if let Some(caps) = fields_shape().captures(line) {
        let pid = parse_pid(&caps[1])?;
        let data = hex_bytes(&caps[2].replace(',', ""))?;
        let checksum = hex_token(&caps[3])?;
        return Ok(LinFrame::new(pid, data, checksum, Direction::Rx)?);
    }

    let is_raw = line
        .get(..3)
        .map(|prefix| prefix.eq_ignore_ascii_case("LIN"))
        .unwrap_or(false);
    if is_raw {
        let parts: Vec<&str> = line.split_whitespace().skip(1).collect();
        // pid, at least one data byte, checksum
        if parts.len() < 3 {
            return Err(DecodeError::TooShort(line.to_string()));
        }
        let pid = parse_pid(parts[0])?;
        let data = parts[1..parts.len() - 1]
            .iter()
            .map(|t| hex_token(t))
            .collect::<Result<Vec<u8>, _>>()?;
        let checksum = hex_token(parts[parts.len() - 1])?;
        return Ok(LinFrame::new(pid, data, checksum, Direction::Rx)?);
    }

    Err(DecodeError::Unrecognized(line.to_string()))
}

/// `LIN:<pid>,<csv hex>,<cks>\r\n` with the enhanced checksum
pub(super) fn encode(pid: ProtectedId, data: &[u8]) -> Result<Vec<u8>, FrameError> {
    if data.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    let checksum = calculate_checksum(pid.raw(), data, ChecksumModel::Enhanced);
    Ok(format!("LIN:{},{},{:02X}\r\n", pid, comma_hex(data), checksum).into_bytes())
}

pub(super) fn format(frame: &LinFrame) -> String {
    format!(
        "PID:{},DATA:{},CKS:{:02X}\r\n",
        frame.pid(),
        comma_hex(frame.data()),
        frame.checksum()
    )
}

pub(super) fn parse_command(line: &str) -> Result<TxCommand, DecodeError> {
    let line = line.trim();
    let caps = send_shape()
        .captures(line)
        .ok_or_else(|| DecodeError::Unrecognized(line.to_string()))?;
    let pid = parse_pid(&caps[1])?;
    let data = caps[2]
        .split(',')
        .map(hex_token)
        .collect::<Result<Vec<u8>, _>>()?;
    let checksum = hex_token(&caps[3])?;
    Ok(TxCommand::Lin(LinFrame::new(
        pid,
        data,
        checksum,
        Direction::Tx,
    )?))
}

fn parse_pid(text: &str) -> Result<ProtectedId, DecodeError> {
    let raw = hex_token(text)?;
    Ok(ProtectedId::from_wire(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fields_shape() {
        let frame = decode("PID:C1,DATA:00,FE,CKS:3F").unwrap();
        assert_eq!(frame.pid().raw(), 0xC1);
        assert_eq!(frame.data(), &[0x00, 0xFE]);
        assert_eq!(frame.checksum(), 0x3F);
    }

    #[test]
    fn test_raw_shape() {
        let frame = decode("lin 3C 01 02 03 B9").unwrap();
        assert_eq!(frame.pid().frame_id(), 0x3C);
        assert_eq!(frame.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(frame.checksum(), 0xB9);
    }

    #[test]
    fn test_bare_frame_id_gets_parity() {
        let frame = decode("PID:01,DATA:00,CKS:FE").unwrap();
        assert_eq!(frame.pid().raw(), 0xC1);
    }

    #[test]
    fn test_bad_parity_rejected() {
        assert_eq!(
            decode("PID:41,DATA:00,CKS:FE"),
            Err(DecodeError::Frame(FrameError::ParityMismatch {
                raw: 0x41,
                expected: 0xC1
            }))
        );
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode("LIN C1 FE"), Err(DecodeError::TooShort(_))));
        assert!(matches!(decode("PID:C1"), Err(DecodeError::Unrecognized(_))));
        assert!(matches!(
            decode("PID:C1,DATA:0,CKS:00"),
            Err(DecodeError::OddHexDigits(_))
        ));
    }

    #[test]
    fn test_checksum_is_not_verified_by_decoder() {
        let frame = decode("PID:C1,DATA:00,CKS:00").unwrap();
        assert!(!frame.checksum_valid(ChecksumModel::Enhanced));
    }

    #[test]
    fn test_encode_is_byte_exact() {
        let pid = ProtectedId::from_frame_id(0x01).unwrap();
        assert_eq!(
            encode(pid, &[0x00]).unwrap(),
            b"LIN:C1,00,3E\r\n".to_vec()
        );
        assert_eq!(encode(pid, &[]), Err(FrameError::EmptyPayload));
    }
}
