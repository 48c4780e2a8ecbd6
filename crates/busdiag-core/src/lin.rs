//! LIN protected-id parity and checksum

use serde::{Deserialize, Serialize};

/// Well-known LIN frame ids
pub mod frame_id {
    /// Diagnostic master request
    pub const MASTER_REQUEST: u8 = 0x3C;
    /// Diagnostic slave response
    pub const SLAVE_RESPONSE: u8 = 0x3D;

    pub fn name(frame_id: u8) -> Option<&'static str> {
        match frame_id {
            MASTER_REQUEST => Some("Master Request"),
            SLAVE_RESPONSE => Some("Slave Response"),
            _ => None,
        }
    }
}

/// Checksum model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumModel {
    /// LIN 1.x: data bytes only
    Classic,
    /// LIN 2.x: protected id plus data bytes
    #[default]
    Enhanced,
}

/// Compute the protected id for a 6-bit frame id
///
/// Bits above the low six are ignored.
pub fn calculate_pid(frame_id: u8) -> u8 {
    let v = frame_id & 0x3F;
    let p0 = (v ^ (v >> 1) ^ (v >> 2) ^ (v >> 4)) & 0x01;
    let p1 = !((v >> 1) ^ (v >> 3) ^ (v >> 4) ^ (v >> 5)) & 0x01;
    v | (p0 << 6) | (p1 << 7)
}

/// Compute the LIN checksum over `data`
///
/// `pid` is only folded in for the enhanced model.
pub fn calculate_checksum(pid: u8, data: &[u8], model: ChecksumModel) -> u8 {
    let init = match model {
        ChecksumModel::Enhanced => pid,
        ChecksumModel::Classic => 0,
    };
    !carry_sum(init, data)
}

/// Running sum where every overflow past 255 subtracts 255
///
/// This is an end-around carry, not a plain modulo. Feeding a frame's
/// checksum back through the same accumulation yields 0xFF.
pub fn carry_sum(init: u8, bytes: &[u8]) -> u8 {
    let mut sum = u16::from(init);
    for &b in bytes {
        sum += u16::from(b);
        if sum > 255 {
            sum -= 255;
        }
    }
    sum as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_pid_regression() {
        assert_eq!(calculate_pid(0x01), 0xC1);
        assert_eq!(calculate_pid(0x00), 0x80);
        assert_eq!(calculate_pid(frame_id::MASTER_REQUEST), 0x3C);
        assert_eq!(calculate_pid(frame_id::SLAVE_RESPONSE), 0x7D);
    }

    #[test]
    fn test_pid_recovers_frame_id_for_every_input() {
        for v in 0u8..=0x3F {
            let pid = calculate_pid(v);
            assert_eq!(pid & 0x3F, v);
            // recomputing from the low bits reproduces the same parity
            assert_eq!(calculate_pid(pid & 0x3F), pid);
        }
    }

    #[test]
    fn test_checksum_closes_to_ff() {
        let checksum = calculate_checksum(0x01, &[0x00], ChecksumModel::Enhanced);
        assert_eq!(checksum, 0xFE);
        assert_eq!(carry_sum(0, &[0x01, 0x00, checksum]), 0xFF);
    }

    #[test]
    fn test_checksum_closes_for_long_payloads() {
        let data = [0xFF, 0xFF, 0x80, 0x7F, 0x01, 0xAA, 0x55, 0xC3];
        for pid in [0x00u8, 0x3C, 0xC1, 0xFF] {
            let checksum = calculate_checksum(pid, &data, ChecksumModel::Enhanced);
            let mut frame = vec![pid];
            frame.extend_from_slice(&data);
            frame.push(checksum);
            assert_eq!(carry_sum(0, &frame), 0xFF);
        }
    }

    #[test]
    fn test_carry_sum_subtracts_255() {
        // 0xFF + 0x02 = 0x101 -> 0x02, not 0x01
        assert_eq!(carry_sum(0, &[0xFF, 0x02]), 0x02);
        assert_eq!(carry_sum(0xFF, &[0x01]), 0x01);
    }

    #[test]
    fn test_classic_checksum_ignores_pid() {
        let data = [0x10, 0x20];
        assert_eq!(
            calculate_checksum(0xC1, &data, ChecksumModel::Classic),
            calculate_checksum(0x00, &data, ChecksumModel::Classic)
        );
        assert_eq!(calculate_checksum(0x00, &data, ChecksumModel::Classic), !0x30u8);
    }
}
