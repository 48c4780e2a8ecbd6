//! Bus frame value types
//!
//! Frames are immutable once constructed: fields are private and every
//! constructor validates the payload against the classic 8-byte limit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::lin::{self, ChecksumModel};

/// Maximum payload of a classic CAN or LIN frame
pub const MAX_CLASSIC_PAYLOAD: usize = 8;

/// Largest 11-bit identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest 29-bit identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// CAN arbitration identifier (11-bit standard or 29-bit extended)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanId {
    raw: u32,
    extended: bool,
}

impl CanId {
    /// Standard 11-bit identifier
    pub fn standard(raw: u32) -> Result<Self, FrameError> {
        if raw > MAX_STANDARD_ID {
            return Err(FrameError::IdOutOfRange {
                id: raw,
                max: MAX_STANDARD_ID,
            });
        }
        Ok(Self {
            raw,
            extended: false,
        })
    }

    /// Extended 29-bit identifier
    pub fn extended(raw: u32) -> Result<Self, FrameError> {
        if raw > MAX_EXTENDED_ID {
            return Err(FrameError::IdOutOfRange {
                id: raw,
                max: MAX_EXTENDED_ID,
            });
        }
        Ok(Self {
            raw,
            extended: true,
        })
    }

    /// Pick standard or extended form from the value alone
    pub fn from_raw(raw: u32) -> Result<Self, FrameError> {
        if raw > MAX_STANDARD_ID {
            Self::extended(raw)
        } else {
            Self::standard(raw)
        }
    }

    /// Parse textual hex ("7E0", "0x18DAF110")
    ///
    /// More than three hex digits selects the extended form even when the
    /// value would fit in 11 bits, so "000007E0" stays extended.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let digits = text
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        if digits.is_empty() || digits.len() > 8 {
            return Err(FrameError::InvalidId(text.to_string()));
        }
        let raw = u32::from_str_radix(digits, 16)
            .map_err(|_| FrameError::InvalidId(text.to_string()))?;
        if digits.len() > 3 {
            Self::extended(raw)
        } else {
            Self::standard(raw)
        }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "{:08X}", self.raw)
        } else {
            write!(f, "{:03X}", self.raw)
        }
    }
}

impl FromStr for CanId {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Frame direction relative to this tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RX" => Ok(Direction::Rx),
            "TX" => Ok(Direction::Tx),
            other => Err(other.to_string()),
        }
    }
}

/// Which bus a frame travelled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusKind {
    /// Classic CAN
    #[default]
    Can,
    /// CAN with flexible data rate
    CanFd,
    /// LIN sub-bus
    Lin,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusKind::Can => "CAN",
            BusKind::CanFd => "CAN-FD",
            BusKind::Lin => "LIN",
        };
        f.write_str(s)
    }
}

/// A decoded application frame on the primary bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    timestamp: DateTime<Utc>,
    id: CanId,
    data: Vec<u8>,
    direction: Direction,
    bus: BusKind,
    channel: u8,
}

impl Frame {
    /// Build a frame stamped with the current time
    pub fn new(id: CanId, data: impl Into<Vec<u8>>, direction: Direction) -> Result<Self, FrameError> {
        let data = data.into();
        if data.len() > MAX_CLASSIC_PAYLOAD {
            return Err(FrameError::PayloadTooLong {
                len: data.len(),
                max: MAX_CLASSIC_PAYLOAD,
            });
        }
        Ok(Self {
            timestamp: Utc::now(),
            id,
            data,
            direction,
            bus: BusKind::Can,
            channel: 0,
        })
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_bus(mut self, bus: BusKind) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn bus(&self) -> BusKind {
        self.bus
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Wall-clock label used by the CSV dialect and the monitor
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format("%H:%M:%S%.3f").to_string()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}] {}",
            self.timestamp_label(),
            self.direction,
            self.id,
            self.data.len(),
            spaced_hex(&self.data)
        )
    }
}

/// LIN protected identifier: 6-bit frame id plus two parity bits
///
/// The parity bits are always derived from the frame id; there is no way
/// to construct a value whose high bits disagree with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProtectedId(u8);

impl ProtectedId {
    pub fn from_frame_id(frame_id: u8) -> Result<Self, FrameError> {
        if frame_id > 0x3F {
            return Err(FrameError::FrameIdOutOfRange(frame_id));
        }
        Ok(Self(lin::calculate_pid(frame_id)))
    }

    /// Accept a raw protected id byte, verifying its parity bits
    pub fn from_raw(raw: u8) -> Result<Self, FrameError> {
        let expected = lin::calculate_pid(raw & 0x3F);
        if raw != expected {
            return Err(FrameError::ParityMismatch { raw, expected });
        }
        Ok(Self(raw))
    }

    /// Interpret a byte as seen on an adapter line
    ///
    /// Values up to 0x3F are bare frame ids and get parity added; anything
    /// larger must already carry correct parity bits.
    pub fn from_wire(raw: u8) -> Result<Self, FrameError> {
        if raw <= 0x3F {
            Self::from_frame_id(raw)
        } else {
            Self::from_raw(raw)
        }
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    pub fn frame_id(&self) -> u8 {
        self.0 & 0x3F
    }
}

impl fmt::Display for ProtectedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// A frame on the LIN sub-bus
///
/// The checksum is carried as received; [`LinFrame::checksum_valid`] lets
/// the caller verify it against either checksum model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinFrame {
    timestamp: DateTime<Utc>,
    pid: ProtectedId,
    data: Vec<u8>,
    checksum: u8,
    direction: Direction,
}

impl LinFrame {
    pub fn new(
        pid: ProtectedId,
        data: impl Into<Vec<u8>>,
        checksum: u8,
        direction: Direction,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        if data.is_empty() {
            return Err(FrameError::EmptyPayload);
        }
        if data.len() > MAX_CLASSIC_PAYLOAD {
            return Err(FrameError::PayloadTooLong {
                len: data.len(),
                max: MAX_CLASSIC_PAYLOAD,
            });
        }
        Ok(Self {
            timestamp: Utc::now(),
            pid,
            data,
            checksum,
            direction,
        })
    }

    /// Build a frame whose checksum is computed with `model`
    pub fn with_computed_checksum(
        pid: ProtectedId,
        data: impl Into<Vec<u8>>,
        model: ChecksumModel,
        direction: Direction,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        let checksum = lin::calculate_checksum(pid.raw(), &data, model);
        Self::new(pid, data, checksum, direction)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn pid(&self) -> ProtectedId {
        self.pid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn checksum_valid(&self, model: ChecksumModel) -> bool {
        lin::calculate_checksum(self.pid.raw(), &self.data, model) == self.checksum
    }
}

impl fmt::Display for LinFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} PID:{} [{}] {} CKS:{:02X}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.direction,
            self.pid,
            self.data.len(),
            spaced_hex(&self.data),
            self.checksum
        )
    }
}

pub(crate) fn spaced_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
