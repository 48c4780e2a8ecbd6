//! DTC (Diagnostic Trouble Code) decoding for ReadDTCInformation (0x19)
//!
//! Records are three bytes: two code bytes and one status byte. The code
//! letter comes from the top two bits of the high byte, the remaining 14
//! bits are printed as four hex digits (`01 00` → `P0100`).

use std::fmt;

use serde::Serialize;

use super::{service_id, DiagError};

/// Sub-function codes for ReadDTCInformation (0x19)
pub mod sub_function {
    /// Report DTCs matching a status mask
    pub const REPORT_DTC_BY_STATUS_MASK: u8 = 0x02;
}

/// Group address for ClearDiagnosticInformation (0x14): all DTCs
pub const GROUP_ALL: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Status byte bits reported by this tool
pub mod status_bit {
    pub const TEST_FAILED: u8 = 0x01;
    pub const PENDING: u8 = 0x02;
    pub const CONFIRMED: u8 = 0x08;
    pub const ACTIVE: u8 = 0x20;

    /// Mask requesting every DTC regardless of status
    pub const ALL: u8 = 0xFF;
}

/// DTC category from the top two bits of the high byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcCategory {
    /// P codes - Powertrain
    Powertrain,
    /// C codes - Chassis
    Chassis,
    /// B codes - Body
    Body,
    /// U codes - Network
    Network,
}

impl DtcCategory {
    pub fn from_dtc_high_byte(high_byte: u8) -> Self {
        match (high_byte >> 6) & 0x03 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    pub fn prefix(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }
}

impl fmt::Display for DtcCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DtcCategory::Powertrain => "powertrain",
            DtcCategory::Chassis => "chassis",
            DtcCategory::Body => "body",
            DtcCategory::Network => "network",
        };
        f.write_str(s)
    }
}

/// Format two code bytes as a DTC string
pub fn decode_dtc(hi: u8, lo: u8) -> String {
    let prefix = DtcCategory::from_dtc_high_byte(hi).prefix();
    let number = (u16::from(hi & 0x3F) << 8) | u16::from(lo);
    format!("{}{:04X}", prefix, number)
}

/// Independent status flags of one DTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DtcStatusFlags {
    pub test_failed: bool,
    pub pending: bool,
    pub confirmed: bool,
    pub active: bool,
    pub raw: u8,
}

impl DtcStatusFlags {
    pub fn from_byte(status: u8) -> Self {
        Self {
            test_failed: status & status_bit::TEST_FAILED != 0,
            pending: status & status_bit::PENDING != 0,
            confirmed: status & status_bit::CONFIRMED != 0,
            active: status & status_bit::ACTIVE != 0,
            raw: status,
        }
    }

    pub fn is_inactive(&self) -> bool {
        !(self.test_failed || self.pending || self.confirmed || self.active)
    }

    pub fn labels(&self) -> Vec<&'static str> {
        [
            (self.test_failed, "Test Failed"),
            (self.pending, "Pending"),
            (self.confirmed, "Confirmed"),
            (self.active, "Active"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }
}

impl fmt::Display for DtcStatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inactive() {
            return f.write_str("Inactive");
        }
        f.write_str(&self.labels().join(", "))
    }
}

/// One reported trouble code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DtcRecord {
    pub code: String,
    pub category: DtcCategory,
    pub status: DtcStatusFlags,
}

impl DtcRecord {
    pub fn new(hi: u8, lo: u8, status: u8) -> Self {
        Self {
            code: decode_dtc(hi, lo),
            category: DtcCategory::from_dtc_high_byte(hi),
            status: DtcStatusFlags::from_byte(status),
        }
    }

    /// Description of well-known codes
    pub fn description(&self) -> Option<&'static str> {
        describe(&self.code)
    }
}

impl fmt::Display for DtcRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.code, self.status)?;
        if let Some(desc) = self.description() {
            write!(f, " {}", desc)?;
        }
        Ok(())
    }
}

/// Parse `59 02 <availability> [hi lo status]*`
///
/// Returns the availability mask and the records; a trailing partial
/// record is ignored.
pub fn parse_dtc_report(response: &[u8]) -> Result<(u8, Vec<DtcRecord>), DiagError> {
    if response.len() < 3 {
        return Err(DiagError::InvalidResponse(format!(
            "DTC report too short: {} bytes",
            response.len()
        )));
    }
    if response[0] != service_id::READ_DTC_INFO + 0x40
        || response[1] != sub_function::REPORT_DTC_BY_STATUS_MASK
    {
        return Err(DiagError::InvalidResponse(format!(
            "Unexpected DTC report header: {:02X} {:02X}",
            response[0], response[1]
        )));
    }

    let availability = response[2];
    let records = response[3..]
        .chunks_exact(3)
        .map(|r| DtcRecord::new(r[0], r[1], r[2]))
        .collect();
    Ok((availability, records))
}

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("P0000", "No Fault"),
    ("P0100", "Mass Air Flow Circuit"),
    ("P0101", "MAF Circuit Range/Performance"),
    ("P0102", "MAF Circuit Low"),
    ("P0103", "MAF Circuit High"),
    ("P0110", "Intake Air Temperature Circuit"),
    ("P0115", "Engine Coolant Temperature Circuit"),
    ("P0120", "Throttle Position Sensor A Circuit"),
    ("P0130", "O2 Sensor Circuit Bank 1 Sensor 1"),
    ("P0171", "System Too Lean Bank 1"),
    ("P0172", "System Too Rich Bank 1"),
    ("P0300", "Random/Multiple Cylinder Misfire"),
    ("P0301", "Cylinder 1 Misfire Detected"),
    ("P0302", "Cylinder 2 Misfire Detected"),
    ("P0303", "Cylinder 3 Misfire Detected"),
    ("P0304", "Cylinder 4 Misfire Detected"),
    ("P0420", "Catalyst System Efficiency Below Threshold"),
    ("P0440", "Evaporative Emission System"),
    ("P0500", "Vehicle Speed Sensor A"),
    ("P0505", "Idle Air Control System"),
    ("P0600", "Serial Communication Link"),
    ("P0700", "Transmission Control System"),
    ("B0001", "Driver Frontal Stage 1 Deployment Control"),
    ("B0100", "Electronic Frontal Sensor 1"),
    ("B1000", "ECU Malfunction"),
    ("B1200", "Climate Control Circuit"),
    ("B1318", "Battery Voltage Low"),
    ("B1342", "ECU Damaged/Defective"),
    ("B1600", "PATS Received Incorrect Key"),
    ("B1601", "PATS Received Invalid Format"),
    ("B1602", "PATS Invalid Key Detected"),
    ("C0000", "Vehicle Speed Information Circuit"),
    ("C0035", "Left Front Wheel Speed Sensor"),
    ("C0040", "Right Front Wheel Speed Sensor"),
    ("C0045", "Left Rear Wheel Speed Sensor"),
    ("C0050", "Right Rear Wheel Speed Sensor"),
    ("C1095", "ABS Hydraulic Pump Motor Circuit"),
    ("U0001", "High Speed CAN Communication Bus"),
    ("U0100", "Lost Communication With ECM/PCM"),
    ("U0121", "Lost Communication With ABS"),
    ("U0140", "Lost Communication With BCM"),
];

fn describe(code: &str) -> Option<&'static str> {
    DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, desc)| *desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_dtc_categories() {
        assert_eq!(decode_dtc(0x01, 0x00), "P0100");
        assert_eq!(decode_dtc(0x40, 0x35), "C0035");
        assert_eq!(decode_dtc(0x96, 0x00), "B1600");
        assert_eq!(decode_dtc(0xC1, 0x00), "U0100");
        assert_eq!(decode_dtc(0x3F, 0xFF), "P3FFF");
    }

    #[test]
    fn test_status_flags() {
        let status = DtcStatusFlags::from_byte(0x09);
        assert!(status.test_failed);
        assert!(status.confirmed);
        assert!(!status.pending);
        assert_eq!(status.to_string(), "Test Failed, Confirmed");

        assert_eq!(DtcStatusFlags::from_byte(0x00).to_string(), "Inactive");
        // bits outside the four reported flags do not count
        assert_eq!(DtcStatusFlags::from_byte(0x44).to_string(), "Inactive");
        assert_eq!(DtcStatusFlags::from_byte(0x22).to_string(), "Pending, Active");
    }

    #[test]
    fn test_parse_dtc_report() {
        let response = [0x59, 0x02, 0xFF, 0x01, 0x00, 0x09, 0xC1, 0x00, 0x28, 0x01];
        let (availability, records) = parse_dtc_report(&response).unwrap();
        assert_eq!(availability, 0xFF);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "P0100");
        assert_eq!(records[0].category, DtcCategory::Powertrain);
        assert_eq!(records[0].description(), Some("Mass Air Flow Circuit"));
        assert_eq!(records[1].code, "U0100");
        assert_eq!(records[1].status.to_string(), "Confirmed, Active");
    }

    #[test]
    fn test_parse_dtc_report_rejects_bad_header() {
        assert!(parse_dtc_report(&[0x59, 0x02]).is_err());
        assert!(parse_dtc_report(&[0x62, 0xF1, 0x90]).is_err());
        let (_, empty) = parse_dtc_report(&[0x59, 0x02, 0xFF]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_record_display() {
        let record = DtcRecord::new(0x01, 0x00, 0x09);
        assert_eq!(record.to_string(), "P0100 [Test Failed, Confirmed] Mass Air Flow Circuit");
        let unknown = DtcRecord::new(0x12, 0x34, 0x00);
        assert_eq!(unknown.to_string(), "P1234 [Inactive]");
    }
}
