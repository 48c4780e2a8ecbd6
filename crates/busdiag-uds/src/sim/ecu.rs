//! Simulated ECU behind the simulated adapter
//!
//! Answers the handful of services the session engine uses. Responses are
//! single frames: anything longer than the payload limit is cut, so a VIN
//! read returns only its first characters.

use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::uds::{dtc, service_id, session_type, KeyAlgorithm, SUPPRESS_POSITIVE_RESPONSE};

/// Negative response codes sent by the simulated ECU
mod nrc {
    pub const SERVICE_NOT_SUPPORTED: u8 = 0x11;
    pub const SUB_FUNCTION_NOT_SUPPORTED: u8 = 0x12;
    pub const INCORRECT_MESSAGE_LENGTH: u8 = 0x13;
    pub const REQUEST_SEQUENCE_ERROR: u8 = 0x24;
    pub const REQUEST_OUT_OF_RANGE: u8 = 0x31;
    pub const INVALID_KEY: u8 = 0x35;
    pub const EXCEEDED_NUMBER_OF_ATTEMPTS: u8 = 0x36;
}

pub fn positive_response(service_id: u8, data: &[u8]) -> Vec<u8> {
    let mut response = Vec::with_capacity(1 + data.len());
    response.push(service_id + 0x40);
    response.extend_from_slice(data);
    response
}

pub fn negative_response(service_id: u8, nrc: u8) -> Vec<u8> {
    vec![service_id::NEGATIVE_RESPONSE, service_id, nrc]
}

const VIN: &[u8] = b"1HGCM82633A123456";
const ECU_SERIAL: &[u8] = b"SN0042";
const ODOMETER_KM: u32 = 123_456;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoredDtc {
    code: [u8; 2],
    status: u8,
}

pub struct SimulatedEcu {
    seed: Vec<u8>,
    algorithm: KeyAlgorithm,
    max_key_attempts: u32,
    max_payload: usize,
    session: u8,
    unlocked: bool,
    current_seed: Option<Vec<u8>>,
    failed_attempts: u32,
    dtcs: Vec<StoredDtc>,
}

impl SimulatedEcu {
    pub fn new(config: &SimulationConfig, max_payload: usize) -> Self {
        Self {
            seed: config.seed.clone(),
            algorithm: KeyAlgorithm::xor(config.secret.clone()),
            max_key_attempts: config.max_key_attempts,
            max_payload,
            session: session_type::DEFAULT,
            unlocked: false,
            current_seed: None,
            failed_attempts: 0,
            dtcs: Self::default_dtcs(),
        }
    }

    fn default_dtcs() -> Vec<StoredDtc> {
        vec![StoredDtc {
            code: [0x01, 0x00],
            status: dtc::status_bit::TEST_FAILED | dtc::status_bit::CONFIRMED,
        }]
    }

    pub fn session(&self) -> u8 {
        self.session
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn is_locked_out(&self) -> bool {
        self.failed_attempts >= self.max_key_attempts
    }

    /// Process one request; `None` means the ECU stays silent
    pub fn process_request(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let Some(&sid) = request.first() else {
            return Some(negative_response(0x00, nrc::INCORRECT_MESSAGE_LENGTH));
        };

        let response = match sid {
            service_id::DIAGNOSTIC_SESSION_CONTROL => self.handle_session_control(request),
            service_id::TESTER_PRESENT => return self.handle_tester_present(request),
            service_id::SECURITY_ACCESS => self.handle_security_access(request),
            service_id::READ_DATA_BY_ID => self.handle_read_data_by_id(request),
            service_id::READ_DTC_INFO => self.handle_read_dtc_info(request),
            service_id::CLEAR_DIAGNOSTIC_INFO => self.handle_clear_dtc(),
            service_id::ECU_RESET => self.handle_ecu_reset(request),
            _ => {
                debug!(service_id = sid, "Unsupported service");
                negative_response(sid, nrc::SERVICE_NOT_SUPPORTED)
            }
        };
        Some(self.fit(response))
    }

    fn fit(&self, mut response: Vec<u8>) -> Vec<u8> {
        response.truncate(self.max_payload);
        response
    }

    fn handle_session_control(&mut self, request: &[u8]) -> Vec<u8> {
        let sid = service_id::DIAGNOSTIC_SESSION_CONTROL;
        let Some(&session) = request.get(1) else {
            return negative_response(sid, nrc::INCORRECT_MESSAGE_LENGTH);
        };

        match session {
            session_type::DEFAULT | session_type::PROGRAMMING | session_type::EXTENDED => {
                if session != self.session && self.unlocked {
                    info!("Session change: security access reset to locked");
                    self.unlocked = false;
                }
                self.session = session;
                info!(session = format!("0x{:02X}", session), "Session changed");
                // P2 = 25 ms, P2* = 500 ms
                positive_response(sid, &[session, 0x00, 0x19, 0x01, 0xF4])
            }
            _ => negative_response(sid, nrc::SUB_FUNCTION_NOT_SUPPORTED),
        }
    }

    fn handle_tester_present(&self, request: &[u8]) -> Option<Vec<u8>> {
        let sub_function = request.get(1).copied().unwrap_or(0);
        if sub_function & SUPPRESS_POSITIVE_RESPONSE != 0 {
            debug!("Tester present (suppressed response)");
            return None;
        }
        Some(positive_response(
            service_id::TESTER_PRESENT,
            &[sub_function & 0x7F],
        ))
    }

    fn handle_security_access(&mut self, request: &[u8]) -> Vec<u8> {
        let sid = service_id::SECURITY_ACCESS;
        let Some(&sub_function) = request.get(1) else {
            return negative_response(sid, nrc::INCORRECT_MESSAGE_LENGTH);
        };

        if sub_function % 2 == 1 {
            if self.is_locked_out() {
                return negative_response(sid, nrc::EXCEEDED_NUMBER_OF_ATTEMPTS);
            }
            let seed = if self.unlocked {
                vec![0; self.seed.len()]
            } else {
                self.seed.clone()
            };
            info!(seed = %hex::encode_upper(&seed), "Security access: providing seed");
            self.current_seed = Some(seed.clone());
            let mut data = vec![sub_function];
            data.extend_from_slice(&seed);
            return positive_response(sid, &data);
        }

        if self.is_locked_out() {
            return negative_response(sid, nrc::EXCEEDED_NUMBER_OF_ATTEMPTS);
        }
        let Some(seed) = self.current_seed.take() else {
            return negative_response(sid, nrc::REQUEST_SEQUENCE_ERROR);
        };

        let key = &request[2..];
        let expected = self.algorithm.compute_key(&seed);

        if key == expected.as_slice() {
            info!("Security access: key accepted");
            self.unlocked = true;
            self.failed_attempts = 0;
            positive_response(sid, &[sub_function])
        } else {
            self.failed_attempts += 1;
            if self.is_locked_out() {
                warn!(attempts = self.failed_attempts, "Security access: attempt limit exceeded");
                negative_response(sid, nrc::EXCEEDED_NUMBER_OF_ATTEMPTS)
            } else {
                info!(
                    expected = %hex::encode_upper(&expected),
                    received = %hex::encode_upper(key),
                    "Security access: invalid key"
                );
                negative_response(sid, nrc::INVALID_KEY)
            }
        }
    }

    fn handle_read_data_by_id(&self, request: &[u8]) -> Vec<u8> {
        let sid = service_id::READ_DATA_BY_ID;
        if request.len() < 3 {
            return negative_response(sid, nrc::INCORRECT_MESSAGE_LENGTH);
        }
        let did = u16::from_be_bytes([request[1], request[2]]);
        let value: Vec<u8> = match did {
            0xF190 => VIN.to_vec(),
            0xF124 => ECU_SERIAL.to_vec(),
            0xF1A0 => ODOMETER_KM.to_be_bytes().to_vec(),
            _ => {
                debug!(did = format!("0x{:04X}", did), "Unknown DID");
                return negative_response(sid, nrc::REQUEST_OUT_OF_RANGE);
            }
        };
        let mut data = request[1..3].to_vec();
        data.extend_from_slice(&value);
        positive_response(sid, &data)
    }

    fn handle_read_dtc_info(&self, request: &[u8]) -> Vec<u8> {
        let sid = service_id::READ_DTC_INFO;
        if request.len() < 3 {
            return negative_response(sid, nrc::INCORRECT_MESSAGE_LENGTH);
        }
        if request[1] != dtc::sub_function::REPORT_DTC_BY_STATUS_MASK {
            return negative_response(sid, nrc::SUB_FUNCTION_NOT_SUPPORTED);
        }

        let mask = request[2];
        let mut data = vec![dtc::sub_function::REPORT_DTC_BY_STATUS_MASK, dtc::status_bit::ALL];
        // 1 byte for the response id
        let room = self.max_payload.saturating_sub(1 + data.len()) / 3;
        for stored in self.dtcs.iter().filter(|d| d.status & mask != 0).take(room) {
            data.extend_from_slice(&stored.code);
            data.push(stored.status);
        }
        info!(mask = format!("0x{:02X}", mask), "Report DTCs by status mask");
        positive_response(sid, &data)
    }

    fn handle_clear_dtc(&mut self) -> Vec<u8> {
        info!(cleared = self.dtcs.len(), "Clear DTCs");
        self.dtcs.clear();
        positive_response(service_id::CLEAR_DIAGNOSTIC_INFO, &[])
    }

    fn handle_ecu_reset(&mut self, request: &[u8]) -> Vec<u8> {
        let sid = service_id::ECU_RESET;
        let Some(&reset_type) = request.get(1) else {
            return negative_response(sid, nrc::INCORRECT_MESSAGE_LENGTH);
        };
        info!(reset_type, "ECU reset");
        self.session = session_type::DEFAULT;
        self.unlocked = false;
        self.current_seed = None;
        positive_response(sid, &[reset_type])
    }
}
