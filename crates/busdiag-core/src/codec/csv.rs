//! Generic CSV lines: `timestamp,id,data_hex,direction`

use chrono::{NaiveTime, Utc};

use super::{hex_bytes, hex_u32};
use crate::error::{DecodeError, FrameError};
use crate::frame::{CanId, Direction, Frame, MAX_STANDARD_ID};

pub(super) fn decode(line: &str, max_payload: usize) -> Result<Frame, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(DecodeError::NotAFrame(String::new()));
    }

    let parts: Vec<&str> = line.splitn(4, ',').collect();
    let [timestamp, id, data_hex, direction] = parts.as_slice() else {
        return Err(DecodeError::Unrecognized(line.to_string()));
    };

    let raw_id = hex_u32(id.trim())?;
    let id = CanId::standard(raw_id)?;

    let data_hex = data_hex.trim();
    if data_hex.len() % 2 != 0 {
        return Err(DecodeError::OddHexDigits(data_hex.to_string()));
    }
    if data_hex.len() > max_payload * 2 {
        return Err(FrameError::PayloadTooLong {
            len: data_hex.len() / 2,
            max: max_payload,
        }
        .into());
    }
    let data = hex_bytes(data_hex)?;

    let direction: Direction = direction
        .trim()
        .parse()
        .map_err(DecodeError::InvalidDirection)?;

    let mut frame = Frame::new(id, data, direction)?;
    if let Some(ts) = parse_time_of_day(timestamp.trim()) {
        frame = frame.with_timestamp(ts);
    }
    Ok(frame)
}

pub(super) fn encode(id: CanId, data: &[u8], direction: Direction) -> Result<Vec<u8>, FrameError> {
    if id.is_extended() || id.raw() > MAX_STANDARD_ID {
        return Err(FrameError::IdOutOfRange {
            id: id.raw(),
            max: MAX_STANDARD_ID,
        });
    }
    let label = Utc::now().format("%H:%M:%S%.3f");
    Ok(format!("{},{},{},{}\n", label, id, hex::encode_upper(data), direction).into_bytes())
}

pub(super) fn format(frame: &Frame) -> Result<String, FrameError> {
    let bytes = encode(frame.id(), frame.data(), frame.direction())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lines carry only a time of day; pin it to today's date
fn parse_time_of_day(text: &str) -> Option<chrono::DateTime<Utc>> {
    let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()?;
    Some(Utc::now().date_naive().and_time(time).and_utc())
}
