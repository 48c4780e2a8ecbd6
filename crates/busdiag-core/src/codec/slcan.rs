//! SLCAN (Lawicel) line protocol
//!
//! Frames: `tIIILDD..` (11-bit) and `TIIIIIIIILDD..` (29-bit). Adapters
//! configured for timestamps append four hex digits after the data.

use std::fmt;

use super::{hex_bytes, hex_u32, TxCommand};
use crate::error::DecodeError;
use crate::frame::{CanId, Direction, Frame, MAX_CLASSIC_PAYLOAD};

const TIMESTAMP_DIGITS: usize = 4;

/// The nine bitrates an SLCAN adapter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CanBitrate {
    Kbit10,
    Kbit20,
    Kbit50,
    Kbit100,
    Kbit125,
    Kbit250,
    #[default]
    Kbit500,
    Kbit800,
    Mbit1,
}

impl CanBitrate {
    pub const ALL: [CanBitrate; 9] = [
        CanBitrate::Kbit10,
        CanBitrate::Kbit20,
        CanBitrate::Kbit50,
        CanBitrate::Kbit100,
        CanBitrate::Kbit125,
        CanBitrate::Kbit250,
        CanBitrate::Kbit500,
        CanBitrate::Kbit800,
        CanBitrate::Mbit1,
    ];

    pub fn from_bps(bps: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.bps() == bps)
    }

    pub fn bps(&self) -> u32 {
        match self {
            CanBitrate::Kbit10 => 10_000,
            CanBitrate::Kbit20 => 20_000,
            CanBitrate::Kbit50 => 50_000,
            CanBitrate::Kbit100 => 100_000,
            CanBitrate::Kbit125 => 125_000,
            CanBitrate::Kbit250 => 250_000,
            CanBitrate::Kbit500 => 500_000,
            CanBitrate::Kbit800 => 800_000,
            CanBitrate::Mbit1 => 1_000_000,
        }
    }

    /// Digit following `S` in the set-bitrate command
    pub fn code(&self) -> u8 {
        match self {
            CanBitrate::Kbit10 => 0,
            CanBitrate::Kbit20 => 1,
            CanBitrate::Kbit50 => 2,
            CanBitrate::Kbit100 => 3,
            CanBitrate::Kbit125 => 4,
            CanBitrate::Kbit250 => 5,
            CanBitrate::Kbit500 => 6,
            CanBitrate::Kbit800 => 7,
            CanBitrate::Mbit1 => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|rate| rate.code() == code)
    }
}

impl fmt::Display for CanBitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bps() {
            1_000_000 => f.write_str("1 Mbit/s"),
            bps => write!(f, "{} kbit/s", bps / 1000),
        }
    }
}

/// SLCAN control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlcanCommand {
    Open,
    Close,
    SetBitrate(CanBitrate),
    Version,
    SerialNumber,
    StatusFlags,
}

impl SlcanCommand {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            SlcanCommand::Open => b"O\r".to_vec(),
            SlcanCommand::Close => b"C\r".to_vec(),
            SlcanCommand::SetBitrate(rate) => format!("S{}\r", rate.code()).into_bytes(),
            SlcanCommand::Version => b"V\r".to_vec(),
            SlcanCommand::SerialNumber => b"N\r".to_vec(),
            SlcanCommand::StatusFlags => b"F\r".to_vec(),
        }
    }
}

pub(super) fn decode(line: &str) -> Result<Frame, DecodeError> {
    let line = line.trim();
    match line.chars().next() {
        Some('t') => decode_data(line, 3, false),
        Some('T') => decode_data(line, 8, true),
        Some('r') | Some('R') => Err(DecodeError::NotAFrame(line.to_string())),
        // acks for transmit (z/Z), status replies, error bell
        Some('z') | Some('Z') | Some('V') | Some('N') | Some('F') | Some('\x07') | None => {
            Err(DecodeError::NotAFrame(line.to_string()))
        }
        Some(_) => Err(DecodeError::Unrecognized(line.to_string())),
    }
}

fn decode_data(line: &str, id_digits: usize, extended: bool) -> Result<Frame, DecodeError> {
    let header = 1 + id_digits + 1;
    if !line.is_ascii() {
        return Err(DecodeError::InvalidHex(line.to_string()));
    }
    if line.len() < header {
        return Err(DecodeError::TooShort(line.to_string()));
    }

    let raw_id = hex_u32(&line[1..1 + id_digits])?;
    let id = if extended {
        CanId::extended(raw_id)?
    } else {
        CanId::standard(raw_id)?
    };

    let dlc_text = &line[1 + id_digits..header];
    let dlc = match u8::from_str_radix(dlc_text, 16) {
        Ok(n) if usize::from(n) <= MAX_CLASSIC_PAYLOAD => usize::from(n),
        _ => return Err(DecodeError::InvalidLength(dlc_text.to_string())),
    };

    let rest = &line[header..];
    let needed = dlc * 2;
    if rest.len() < needed {
        return Err(DecodeError::Truncated {
            expected: needed,
            actual: rest.len(),
        });
    }
    let extra = rest.len() - needed;
    if extra % 2 != 0 {
        return Err(DecodeError::OddHexDigits(rest.to_string()));
    }
    if extra != 0 && extra != TIMESTAMP_DIGITS {
        return Err(DecodeError::TrailingData(rest[needed..].to_string()));
    }

    let data = hex_bytes(&rest[..needed])?;
    Ok(Frame::new(id, data, Direction::Rx)?)
}

pub(super) fn encode(id: CanId, data: &[u8]) -> Vec<u8> {
    FrameRef { id, data }.to_string().into_bytes()
}

/// Adapters echo received frames in the transmit grammar
pub(super) fn format(frame: &Frame) -> String {
    FrameRef {
        id: frame.id(),
        data: frame.data(),
    }
    .to_string()
}

struct FrameRef<'a> {
    id: CanId,
    data: &'a [u8],
}

impl fmt::Display for FrameRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_extended() {
            write!(f, "T{:08X}", self.id.raw())?;
        } else {
            write!(f, "t{:03X}", self.id.raw())?;
        }
        write!(f, "{}{}\r", self.data.len(), hex::encode_upper(self.data))
    }
}

pub(super) fn parse_command(line: &str) -> Result<TxCommand, DecodeError> {
    let line = line.trim();
    match line {
        "O" => Ok(TxCommand::Slcan(SlcanCommand::Open)),
        "C" => Ok(TxCommand::Slcan(SlcanCommand::Close)),
        "V" => Ok(TxCommand::Slcan(SlcanCommand::Version)),
        "N" => Ok(TxCommand::Slcan(SlcanCommand::SerialNumber)),
        "F" => Ok(TxCommand::Slcan(SlcanCommand::StatusFlags)),
        _ if line.starts_with('S') => line[1..]
            .parse::<u8>()
            .ok()
            .and_then(CanBitrate::from_code)
            .map(|rate| TxCommand::Slcan(SlcanCommand::SetBitrate(rate)))
            .ok_or_else(|| DecodeError::Unrecognized(line.to_string())),
        _ => {
            let frame = decode(line)?;
            Ok(TxCommand::Frame {
                id: frame.id(),
                data: frame.data().to_vec(),
            })
        }
    }
}
