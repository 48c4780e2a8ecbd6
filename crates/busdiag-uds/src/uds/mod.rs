//! UDS (Unified Diagnostic Services) protocol pieces
//!
//! Only the services used by the session engine and the simulated ECU are
//! covered. Requests and responses travel in single frames, so every
//! payload is at most the adapter's maximum payload.

mod annotate;
pub mod dtc;
mod error;
mod nrc;
pub mod security;

use std::fmt;

use busdiag_core::{CanId, FrameError};

pub use annotate::{annotate, annotate_frame};
pub use dtc::{decode_dtc, parse_dtc_report, DtcCategory, DtcRecord, DtcStatusFlags};
pub use error::{DiagError, DiagResult};
pub use nrc::NegativeResponseCode;
pub use security::KeyAlgorithm;

/// Standard UDS service ID constants
pub mod service_id {
    pub const DIAGNOSTIC_SESSION_CONTROL: u8 = 0x10;
    pub const ECU_RESET: u8 = 0x11;
    pub const CLEAR_DIAGNOSTIC_INFO: u8 = 0x14;
    pub const READ_DTC_INFO: u8 = 0x19;
    pub const READ_DATA_BY_ID: u8 = 0x22;
    pub const SECURITY_ACCESS: u8 = 0x27;
    pub const WRITE_DATA_BY_ID: u8 = 0x2E;
    pub const ROUTINE_CONTROL: u8 = 0x31;
    pub const TRANSFER_DATA: u8 = 0x36;
    pub const TESTER_PRESENT: u8 = 0x3E;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// DiagnosticSessionControl (0x10) session types
pub mod session_type {
    pub const DEFAULT: u8 = 0x01;
    pub const PROGRAMMING: u8 = 0x02;
    pub const EXTENDED: u8 = 0x03;
}

/// ECUReset (0x11) sub-functions
pub mod reset_type {
    /// Complete shutdown and restart of the ECU
    pub const HARD_RESET: u8 = 0x01;
    pub const KEY_OFF_ON_RESET: u8 = 0x02;
    /// Application-level restart
    pub const SOFT_RESET: u8 = 0x03;
}

/// TesterPresent (0x3E) sub-function bit suppressing the positive response
pub const SUPPRESS_POSITIVE_RESPONSE: u8 = 0x80;

pub fn positive_response_id(service_id: u8) -> u8 {
    service_id.wrapping_add(0x40)
}

/// Display name of a request service id
pub fn service_name(sid: u8) -> Option<&'static str> {
    let name = match sid {
        service_id::DIAGNOSTIC_SESSION_CONTROL => "DiagnosticSessionControl",
        service_id::ECU_RESET => "ECUReset",
        service_id::CLEAR_DIAGNOSTIC_INFO => "ClearDiagnosticInformation",
        service_id::READ_DTC_INFO => "ReadDTCInformation",
        service_id::READ_DATA_BY_ID => "ReadDataByIdentifier",
        service_id::SECURITY_ACCESS => "SecurityAccess",
        service_id::WRITE_DATA_BY_ID => "WriteDataByIdentifier",
        service_id::ROUTINE_CONTROL => "RoutineControl",
        service_id::TRANSFER_DATA => "TransferData",
        service_id::TESTER_PRESENT => "TesterPresent",
        _ => return None,
    };
    Some(name)
}

/// Kind of ECU reset requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetKind {
    #[default]
    Hard,
    KeyOffOn,
    Soft,
}

impl ResetKind {
    pub fn sub_function(&self) -> u8 {
        match self {
            ResetKind::Hard => reset_type::HARD_RESET,
            ResetKind::KeyOffOn => reset_type::KEY_OFF_ON_RESET,
            ResetKind::Soft => reset_type::SOFT_RESET,
        }
    }
}

impl fmt::Display for ResetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetKind::Hard => f.write_str("hard"),
            ResetKind::KeyOffOn => f.write_str("key off/on"),
            ResetKind::Soft => f.write_str("soft"),
        }
    }
}

/// Request/response id pair of one ECU
///
/// The common 11-bit convention places the physical request id 8 below
/// the response id (0x7E0 / 0x7E8). This holds for OBD-style ECUs only;
/// configurations should carry both ids explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcuAddress {
    pub tx_id: CanId,
    pub rx_id: CanId,
}

impl EcuAddress {
    pub fn from_ids(tx_id: u32, rx_id: u32) -> Result<Self, FrameError> {
        Ok(Self {
            tx_id: CanId::from_raw(tx_id)?,
            rx_id: CanId::from_raw(rx_id)?,
        })
    }

    /// Derive the request id as `rx - 8`
    pub fn from_response_id(rx_id: CanId) -> Result<Self, FrameError> {
        let raw = rx_id
            .raw()
            .checked_sub(8)
            .ok_or(FrameError::IdOutOfRange {
                id: rx_id.raw(),
                max: u32::MAX,
            })?;
        let tx_id = if rx_id.is_extended() {
            CanId::extended(raw)?
        } else {
            CanId::standard(raw)?
        };
        Ok(Self { tx_id, rx_id })
    }
}

impl fmt::Display for EcuAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.tx_id, self.rx_id)
    }
}
