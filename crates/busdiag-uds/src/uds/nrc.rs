//! UDS Negative Response Codes (NRC)

use std::fmt;

use serde::Serialize;

/// Reason code carried by a `7F <sid> <nrc>` negative response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NegativeResponseCode {
    GeneralReject,
    ServiceNotSupported,
    SubFunctionNotSupported,
    IncorrectMessageLengthOrFormat,
    ResponseTooLong,
    BusyRepeatRequest,
    ConditionsNotCorrect,
    RequestSequenceError,
    NoResponseFromSubnet,
    FailurePreventsExecution,
    RequestOutOfRange,
    SecurityAccessDenied,
    InvalidKey,
    ExceededNumberOfAttempts,
    RequiredTimeDelayNotExpired,
    UploadDownloadNotAccepted,
    TransferDataSuspended,
    GeneralProgrammingFailure,
    WrongBlockSequenceCounter,
    /// Request received, final response follows later
    ResponsePending,
    SubFunctionNotSupportedInActiveSession,
    ServiceNotSupportedInActiveSession,
    Unknown(u8),
}

impl NegativeResponseCode {
    /// Human readable description, as shown in frame annotations
    pub fn description(&self) -> String {
        let text = match self {
            Self::GeneralReject => "General Reject",
            Self::ServiceNotSupported => "Service Not Supported",
            Self::SubFunctionNotSupported => "Sub-Function Not Supported",
            Self::IncorrectMessageLengthOrFormat => "Invalid Format",
            Self::ResponseTooLong => "Response Too Long",
            Self::BusyRepeatRequest => "Busy Repeat Request",
            Self::ConditionsNotCorrect => "Conditions Not Correct",
            Self::RequestSequenceError => "Request Sequence Error",
            Self::NoResponseFromSubnet => "No Response From Subnet",
            Self::FailurePreventsExecution => "Failure Prevents Execution",
            Self::RequestOutOfRange => "Request Out Of Range",
            Self::SecurityAccessDenied => "Security Access Denied",
            Self::InvalidKey => "Invalid Key",
            Self::ExceededNumberOfAttempts => "Exceeded Number Of Attempts",
            Self::RequiredTimeDelayNotExpired => "Required Time Delay Not Expired",
            Self::UploadDownloadNotAccepted => "Upload/Download Not Accepted",
            Self::TransferDataSuspended => "Transfer Data Suspended",
            Self::GeneralProgrammingFailure => "General Programming Failure",
            Self::WrongBlockSequenceCounter => "Wrong Block Sequence Counter",
            Self::ResponsePending => "Request Correctly Received - Response Pending",
            Self::SubFunctionNotSupportedInActiveSession => {
                "Sub-Function Not Supported In Active Session"
            }
            Self::ServiceNotSupportedInActiveSession => "Service Not Supported In Active Session",
            Self::Unknown(v) => return format!("Unknown NRC: {:02X}", v),
        };
        text.to_string()
    }
}

impl From<u8> for NegativeResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::GeneralReject,
            0x11 => Self::ServiceNotSupported,
            0x12 => Self::SubFunctionNotSupported,
            0x13 => Self::IncorrectMessageLengthOrFormat,
            0x14 => Self::ResponseTooLong,
            0x21 => Self::BusyRepeatRequest,
            0x22 => Self::ConditionsNotCorrect,
            0x24 => Self::RequestSequenceError,
            0x25 => Self::NoResponseFromSubnet,
            0x26 => Self::FailurePreventsExecution,
            0x31 => Self::RequestOutOfRange,
            0x33 => Self::SecurityAccessDenied,
            0x35 => Self::InvalidKey,
            0x36 => Self::ExceededNumberOfAttempts,
            0x37 => Self::RequiredTimeDelayNotExpired,
            0x70 => Self::UploadDownloadNotAccepted,
            0x71 => Self::TransferDataSuspended,
            0x72 => Self::GeneralProgrammingFailure,
            0x73 => Self::WrongBlockSequenceCounter,
            0x78 => Self::ResponsePending,
            0x7E => Self::SubFunctionNotSupportedInActiveSession,
            0x7F => Self::ServiceNotSupportedInActiveSession,
            other => Self::Unknown(other),
        }
    }
}

impl From<NegativeResponseCode> for u8 {
    fn from(nrc: NegativeResponseCode) -> Self {
        match nrc {
            NegativeResponseCode::GeneralReject => 0x10,
            NegativeResponseCode::ServiceNotSupported => 0x11,
            NegativeResponseCode::SubFunctionNotSupported => 0x12,
            NegativeResponseCode::IncorrectMessageLengthOrFormat => 0x13,
            NegativeResponseCode::ResponseTooLong => 0x14,
            NegativeResponseCode::BusyRepeatRequest => 0x21,
            NegativeResponseCode::ConditionsNotCorrect => 0x22,
            NegativeResponseCode::RequestSequenceError => 0x24,
            NegativeResponseCode::NoResponseFromSubnet => 0x25,
            NegativeResponseCode::FailurePreventsExecution => 0x26,
            NegativeResponseCode::RequestOutOfRange => 0x31,
            NegativeResponseCode::SecurityAccessDenied => 0x33,
            NegativeResponseCode::InvalidKey => 0x35,
            NegativeResponseCode::ExceededNumberOfAttempts => 0x36,
            NegativeResponseCode::RequiredTimeDelayNotExpired => 0x37,
            NegativeResponseCode::UploadDownloadNotAccepted => 0x70,
            NegativeResponseCode::TransferDataSuspended => 0x71,
            NegativeResponseCode::GeneralProgrammingFailure => 0x72,
            NegativeResponseCode::WrongBlockSequenceCounter => 0x73,
            NegativeResponseCode::ResponsePending => 0x78,
            NegativeResponseCode::SubFunctionNotSupportedInActiveSession => 0x7E,
            NegativeResponseCode::ServiceNotSupportedInActiveSession => 0x7F,
            NegativeResponseCode::Unknown(v) => v,
        }
    }
}

impl fmt::UpperHex for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: u8 = (*self).into();
        fmt::UpperHex::fmt(&value, f)
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(v) => write!(f, "Unknown(0x{:02X})", v),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
