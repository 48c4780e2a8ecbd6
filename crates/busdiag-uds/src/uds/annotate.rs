//! Human readable descriptions of UDS frames

use busdiag_conv::{raw_hex, DidTable};
use busdiag_core::BusFrame;

use super::{service_id, service_name, NegativeResponseCode};

/// Describe a frame payload as a UDS request or response
///
/// Returns `None` for payloads that do not look like UDS.
pub fn annotate(data: &[u8], dids: &DidTable) -> Option<String> {
    let (&sid, rest) = data.split_first()?;

    if sid == service_id::NEGATIVE_RESPONSE {
        if data.len() < 3 {
            return None;
        }
        let nrc = NegativeResponseCode::from(data[2]);
        return Some(format!(
            "Negative Response → SID: {:02X}, {}",
            data[1],
            nrc.description()
        ));
    }

    if sid >= 0x40 {
        let request = sid - 0x40;
        let name = service_name(request)?;
        if request == service_id::READ_DATA_BY_ID && rest.len() >= 2 {
            let did = u16::from_be_bytes([rest[0], rest[1]]);
            let value = if rest.len() > 2 {
                dids.decode(did, &rest[2..]).value
            } else {
                "No Data".to_string()
            };
            return Some(format!(
                "{} Response → DID: {}, {}",
                name,
                dids.decode(did, &[]).name,
                value
            ));
        }
        if rest.is_empty() {
            return Some(format!("{} Response", name));
        }
        return Some(format!("{} Response → Data: {}", name, raw_hex(rest)));
    }

    let name = service_name(sid)?;
    let details = request_details(sid, rest, dids);
    Some(match details {
        Some(details) => format!("{} → {}", name, details),
        None => name.to_string(),
    })
}

pub fn annotate_frame(frame: &BusFrame, dids: &DidTable) -> Option<String> {
    annotate(frame.data(), dids)
}

fn request_details(sid: u8, rest: &[u8], dids: &DidTable) -> Option<String> {
    let first = rest.first().copied();
    match sid {
        service_id::DIAGNOSTIC_SESSION_CONTROL => first.map(|b| format!("Session: {:02X}", b)),
        service_id::ECU_RESET => first.map(|b| format!("Reset Type: {:02X}", b)),
        service_id::CLEAR_DIAGNOSTIC_INFO if rest.len() >= 3 => Some(format!(
            "DTC: {:02X}{:02X}{:02X}",
            rest[0], rest[1], rest[2]
        )),
        service_id::READ_DTC_INFO => first.map(|b| format!("Sub-Function: {:02X}", b)),
        service_id::READ_DATA_BY_ID if rest.len() >= 2 => {
            let did = u16::from_be_bytes([rest[0], rest[1]]);
            Some(format!("DID: {}", dids.decode(did, &[]).name))
        }
        service_id::SECURITY_ACCESS => first.map(|b| format!("Level: {:02X}", b)),
        service_id::WRITE_DATA_BY_ID if rest.len() >= 3 => {
            let did = u16::from_be_bytes([rest[0], rest[1]]);
            let reading = dids.decode(did, &rest[2..]);
            Some(format!("DID: {}, Data: {}", reading.name, reading.value))
        }
        service_id::ROUTINE_CONTROL if rest.len() >= 3 => Some(format!(
            "Type: {:02X}, Routine: {:02X}{:02X}",
            rest[0], rest[1], rest[2]
        )),
        service_id::TRANSFER_DATA if rest.len() >= 2 => Some(format!(
            "Block: {:02X}, Data: {}",
            rest[0],
            raw_hex(&rest[1..])
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dids() -> DidTable {
        DidTable::builtin()
    }

    #[test]
    fn test_annotate_requests() {
        let t = dids();
        assert_eq!(
            annotate(&[0x10, 0x03], &t).unwrap(),
            "DiagnosticSessionControl → Session: 03"
        );
        assert_eq!(
            annotate(&[0x22, 0xF1, 0x90], &t).unwrap(),
            "ReadDataByIdentifier → DID: VIN"
        );
        assert_eq!(
            annotate(&[0x14, 0xFF, 0xFF, 0xFF], &t).unwrap(),
            "ClearDiagnosticInformation → DTC: FFFFFF"
        );
        assert_eq!(annotate(&[0x3E, 0x80], &t).unwrap(), "TesterPresent");
    }

    #[test]
    fn test_annotate_responses() {
        let t = dids();
        let mut vin = vec![0x62, 0xF1, 0x90];
        vin.extend_from_slice(b"1HGCM");
        assert_eq!(
            annotate(&vin, &t).unwrap(),
            "ReadDataByIdentifier Response → DID: VIN, 1HGCM"
        );
        assert_eq!(
            annotate(&[0x62, 0x12, 0x34, 0xAB], &t).unwrap(),
            "ReadDataByIdentifier Response → DID: 0x1234, AB"
        );
        assert_eq!(
            annotate(&[0x67, 0x01, 0xAA, 0xBB], &t).unwrap(),
            "SecurityAccess Response → Data: 01 AA BB"
        );
        assert_eq!(
            annotate(&[0x54], &t).unwrap(),
            "ClearDiagnosticInformation Response"
        );
    }

    #[test]
    fn test_annotate_negative_response() {
        assert_eq!(
            annotate(&[0x7F, 0x27, 0x35], &dids()).unwrap(),
            "Negative Response → SID: 27, Invalid Key"
        );
    }

    #[test]
    fn test_annotate_non_uds() {
        let t = dids();
        assert_eq!(annotate(&[], &t), None);
        assert_eq!(annotate(&[0x01, 0x02], &t), None);
        assert_eq!(annotate(&[0x7F, 0x27], &t), None);
    }
}
