//! Diagnostic session engine

use std::sync::Arc;

use busdiag_conv::{DidReading, DidTable};
use busdiag_core::{BusFrame, CanId, Direction};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::keepalive::Keepalive;
use super::pending::{PendingRequest, PendingSlot};
use super::{SecurityState, SessionPhase};
use crate::bus::next_frame;
use crate::config::SessionConfig;
use crate::transport::{ConnectionState, FrameLink, TransportEvent};
use crate::uds::security::{check_level, key_sub_function, seed_means_unlocked};
use crate::uds::{
    annotate_frame, dtc, parse_dtc_report, service_id, DiagError, DiagResult, DtcRecord,
    EcuAddress, NegativeResponseCode, ResetKind,
};

#[derive(Debug, Default)]
struct EngineState {
    phase: SessionPhase,
    session_type: Option<u8>,
    security: SecurityState,
    level: Option<u8>,
    seed: Vec<u8>,
    failed_attempts: u32,
}

impl EngineState {
    /// Back to `Idle`; a lockout and its attempt count survive
    fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.session_type = None;
        self.relock();
    }

    fn relock(&mut self) {
        self.level = None;
        self.seed.clear();
        if self.security != SecurityState::LockedOut {
            self.security = SecurityState::Locked;
        }
    }
}

struct Inner {
    link: Arc<dyn FrameLink>,
    address: EcuAddress,
    config: SessionConfig,
    dids: RwLock<DidTable>,
    state: Mutex<EngineState>,
    pending: PendingSlot,
    keepalive: Mutex<Option<Keepalive>>,
    shutdown: CancellationToken,
}

/// UDS client for one ECU
///
/// Requests are strictly one at a time: issuing a request while another is
/// outstanding supersedes the older one, whose caller gets
/// [`DiagError::Superseded`]. Failures are returned to the caller that
/// issued the request and never published as transport events.
///
/// Must be created inside a tokio runtime; a background task routes
/// received frames and reacts to the link dropping.
pub struct DiagnosticEngine {
    inner: Arc<Inner>,
}

impl DiagnosticEngine {
    pub fn new(
        link: Arc<dyn FrameLink>,
        config: SessionConfig,
        dids: DidTable,
    ) -> DiagResult<Self> {
        let address = EcuAddress::from_ids(config.tx_id, config.rx_id)
            .map_err(|e| DiagError::InvalidArgument(format!("ECU address: {}", e)))?;

        let inner = Arc::new(Inner {
            link,
            address,
            config,
            dids: RwLock::new(dids),
            state: Mutex::new(EngineState::default()),
            pending: PendingSlot::new(),
            keepalive: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        let frames = inner.link.subscribe_frames();
        let events = inner.link.subscribe_events();
        tokio::spawn(Inner::dispatch(inner.clone(), frames, events));

        info!(address = %address, "Diagnostic engine ready");
        Ok(Self { inner })
    }

    pub fn address(&self) -> EcuAddress {
        self.inner.address
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase
    }

    /// Session type of the active session
    pub fn session_type(&self) -> Option<u8> {
        let state = self.inner.state.lock();
        match state.phase {
            SessionPhase::SessionActive => state.session_type,
            _ => None,
        }
    }

    pub fn security_state(&self) -> SecurityState {
        self.inner.state.lock().security
    }

    /// Security level of the current seed/key exchange
    pub fn security_level(&self) -> Option<u8> {
        self.inner.state.lock().level
    }

    /// Seed held for the next `send_key`
    pub fn seed(&self) -> Option<Vec<u8>> {
        let state = self.inner.state.lock();
        (state.security == SecurityState::SeedHeld).then(|| state.seed.clone())
    }

    pub fn failed_attempts(&self) -> u32 {
        self.inner.state.lock().failed_attempts
    }

    pub fn keepalive_running(&self) -> bool {
        self.inner
            .keepalive
            .lock()
            .as_ref()
            .is_some_and(|k| k.is_running())
    }

    pub fn pending_request(&self) -> Option<PendingRequest> {
        self.inner.pending.current()
    }

    /// Swap the DID table used by `read_did` and `annotate`
    pub fn reload_dids(&self, table: DidTable) {
        info!(entries = table.len(), "DID table reloaded");
        *self.inner.dids.write() = table;
    }

    pub fn annotate(&self, frame: &BusFrame) -> Option<String> {
        annotate_frame(frame, &self.inner.dids.read())
    }

    /// Send any request and wait for its positive response (returned whole)
    pub async fn send_diagnostic_request(
        &self,
        service_id: u8,
        payload: &[u8],
    ) -> DiagResult<Vec<u8>> {
        let mut request = Vec::with_capacity(1 + payload.len());
        request.push(service_id);
        request.extend_from_slice(payload);
        self.inner.transact(&request).await
    }

    /// DiagnosticSessionControl (0x10)
    ///
    /// Security returns to `Locked` on every session change. The keepalive
    /// runs for as long as the session stays active.
    pub async fn start_session(&self, session_type: u8) -> DiagResult<()> {
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = state.phase;
            state.phase = SessionPhase::SessionRequested;
            previous
        };
        debug!(session_type = format!("0x{:02X}", session_type), "Requesting session");

        let result = self
            .inner
            .transact(&[service_id::DIAGNOSTIC_SESSION_CONTROL, session_type])
            .await
            .and_then(|response| match response.get(1) {
                Some(&echo) if echo == session_type => Ok(()),
                _ => Err(DiagError::InvalidResponse(format!(
                    "session control response does not echo session 0x{:02X}",
                    session_type
                ))),
            });

        if let Err(e) = result {
            let mut state = self.inner.state.lock();
            if state.phase == SessionPhase::SessionRequested {
                state.phase = previous;
            }
            return Err(e);
        }

        {
            let mut state = self.inner.state.lock();
            state.phase = SessionPhase::SessionActive;
            state.session_type = Some(session_type);
            state.relock();
        }
        self.inner.start_keepalive();
        info!(
            session_type = format!("0x{:02X}", session_type),
            "Session active (security re-locked)"
        );
        Ok(())
    }

    /// SecurityAccess request seed (0x27, odd level)
    ///
    /// An empty or all-zero seed means the level is already unlocked.
    pub async fn request_seed(&self, level: u8) -> DiagResult<Vec<u8>> {
        check_level(level)?;
        {
            let mut state = self.inner.state.lock();
            if state.security == SecurityState::LockedOut {
                return Err(DiagError::LockedOut);
            }
            if state.phase != SessionPhase::SessionActive {
                return Err(DiagError::InvalidState(format!(
                    "seed request needs an active session ({})",
                    state.phase
                )));
            }
            state.security = SecurityState::SeedRequested;
            state.level = Some(level);
            state.seed.clear();
        }

        let response = match self
            .inner
            .transact(&[service_id::SECURITY_ACCESS, level])
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(self.inner.security_failed(e)),
        };
        if response.get(1) != Some(&level) {
            let mut state = self.inner.state.lock();
            state.relock();
            return Err(DiagError::InvalidResponse(format!(
                "seed response does not echo level 0x{:02X}",
                level
            )));
        }

        let seed = response[2..].to_vec();
        let mut state = self.inner.state.lock();
        if seed_means_unlocked(&seed) {
            state.security = SecurityState::Unlocked;
            info!(level, "Security already unlocked (zero seed)");
        } else {
            state.security = SecurityState::SeedHeld;
            state.seed = seed.clone();
            info!(level, seed = %hex::encode_upper(&seed), "Security seed received");
        }
        Ok(seed)
    }

    /// SecurityAccess send key (0x27, level + 1)
    ///
    /// Only valid while a seed is held. A rejected key counts towards the
    /// attempt limit; reaching it ends in [`DiagError::LockedOut`].
    pub async fn send_key(&self, key: &[u8]) -> DiagResult<()> {
        let max_payload = self.inner.link.max_payload();
        let sub_function = {
            let mut state = self.inner.state.lock();
            match (state.security, state.level) {
                (SecurityState::LockedOut, _) => return Err(DiagError::LockedOut),
                (SecurityState::SeedHeld, Some(level)) => {
                    if 2 + key.len() > max_payload {
                        return Err(DiagError::InvalidArgument(format!(
                            "key of {} bytes does not fit a {} byte frame",
                            key.len(),
                            max_payload
                        )));
                    }
                    state.security = SecurityState::KeySent;
                    key_sub_function(level)?
                }
                (security, _) => {
                    return Err(DiagError::InvalidState(format!(
                        "send_key needs a held seed (security is {})",
                        security
                    )))
                }
            }
        };

        let mut request = vec![service_id::SECURITY_ACCESS, sub_function];
        request.extend_from_slice(key);
        match self.inner.transact(&request).await {
            Ok(_) => {
                let mut state = self.inner.state.lock();
                state.security = SecurityState::Unlocked;
                state.seed.clear();
                state.failed_attempts = 0;
                info!(level = sub_function - 1, "Security access granted");
                Ok(())
            }
            Err(e) => Err(self.inner.security_failed(e)),
        }
    }

    /// ReadDataByIdentifier (0x22), decoded through the current DID table
    pub async fn read_did(&self, did: u16) -> DiagResult<DidReading> {
        let [hi, lo] = did.to_be_bytes();
        let response = self
            .inner
            .transact(&[service_id::READ_DATA_BY_ID, hi, lo])
            .await?;
        if response.len() < 3 || response[1..3] != [hi, lo] {
            return Err(DiagError::InvalidResponse(format!(
                "response does not echo DID {:04X}",
                did
            )));
        }
        self.inner
            .dids
            .read()
            .decode_response(&response[1..])
            .map_err(|e| DiagError::InvalidResponse(e.to_string()))
    }

    /// ReadDTCInformation by status mask (0x19 0x02)
    pub async fn read_dtcs(&self, status_mask: u8) -> DiagResult<Vec<DtcRecord>> {
        let response = self
            .inner
            .transact(&[
                service_id::READ_DTC_INFO,
                dtc::sub_function::REPORT_DTC_BY_STATUS_MASK,
                status_mask,
            ])
            .await?;
        let (availability, records) = parse_dtc_report(&response)?;
        debug!(
            availability = format!("0x{:02X}", availability),
            count = records.len(),
            "DTCs read"
        );
        Ok(records)
    }

    /// ClearDiagnosticInformation (0x14) for all groups
    pub async fn clear_dtcs(&self) -> DiagResult<()> {
        let mut request = vec![service_id::CLEAR_DIAGNOSTIC_INFO];
        request.extend_from_slice(&dtc::GROUP_ALL);
        self.inner.transact(&request).await?;
        info!("DTCs cleared");
        Ok(())
    }

    /// ECUReset (0x11); on success the engine returns to `Idle`
    pub async fn ecu_reset(&self, kind: ResetKind) -> DiagResult<()> {
        self.inner
            .transact(&[service_id::ECU_RESET, kind.sub_function()])
            .await?;
        self.inner.reset_session();
        info!(kind = ?kind, "ECU reset, session state back to idle");
        Ok(())
    }

    /// Leave the session locally: keepalive stops and security re-locks
    pub fn end_session(&self) {
        self.inner.pending.cancel();
        self.inner.reset_session();
        info!("Session ended");
    }
}

impl Drop for DiagnosticEngine {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
        self.inner.stop_keepalive();
    }
}

impl Inner {
    /// Send one request through the pending slot and wait for its answer
    async fn transact(&self, request: &[u8]) -> DiagResult<Vec<u8>> {
        let Some(&sid) = request.first() else {
            return Err(DiagError::InvalidArgument("empty request".to_string()));
        };
        let max_payload = self.link.max_payload();
        if request.len() > max_payload {
            return Err(DiagError::InvalidArgument(format!(
                "request of {} bytes exceeds the {} byte frame payload",
                request.len(),
                max_payload
            )));
        }

        let timeout = self.config.request_timeout();
        let (key, mut rx) = self.pending.install(sid, timeout);
        trace!(request = %hex::encode_upper(request), "Sending diagnostic request");
        if let Err(e) = self.link.send_frame(self.address.tx_id, request).await {
            self.pending.finish(key);
            return Err(e.into());
        }

        let mut deadline = tokio::time::Instant::now() + timeout;
        loop {
            let delivery = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => return Err(DiagError::Superseded),
                Err(_) => {
                    self.pending.finish(key);
                    warn!(
                        service_id = format!("0x{:02X}", sid),
                        timeout_ms = self.config.request_timeout_ms,
                        "Diagnostic request timed out"
                    );
                    return Err(DiagError::Timeout {
                        timeout_ms: self.config.request_timeout_ms,
                    });
                }
            };
            let response = delivery?;

            if response[0] != service_id::NEGATIVE_RESPONSE {
                self.pending.finish(key);
                trace!(response = %hex::encode_upper(&response), "Positive response");
                return Ok(response);
            }

            let Some(&code) = response.get(2) else {
                self.pending.finish(key);
                return Err(DiagError::InvalidResponse(format!(
                    "negative response too short: {}",
                    hex::encode_upper(&response)
                )));
            };
            let nrc = NegativeResponseCode::from(code);
            if nrc == NegativeResponseCode::ResponsePending {
                debug!(service_id = format!("0x{:02X}", sid), "Response pending, extending deadline");
                deadline = tokio::time::Instant::now() + timeout;
                continue;
            }

            self.pending.finish(key);
            debug!(service_id = format!("0x{:02X}", sid), nrc = %nrc, "Negative response");
            return Err(DiagError::NegativeResponse {
                service_id: sid,
                nrc,
            });
        }
    }

    /// Security state after a failed seed or key exchange
    fn security_failed(&self, error: DiagError) -> DiagError {
        let limit = self.config.max_key_attempts;
        let mut state = self.state.lock();
        match &error {
            DiagError::NegativeResponse {
                nrc: NegativeResponseCode::ExceededNumberOfAttempts,
                ..
            } => {
                if state.security == SecurityState::KeySent {
                    state.failed_attempts += 1;
                }
                state.security = SecurityState::LockedOut;
                state.seed.clear();
                warn!(attempts = state.failed_attempts, "ECU reports security lockout");
                DiagError::LockedOut
            }
            DiagError::NegativeResponse {
                nrc: NegativeResponseCode::InvalidKey,
                ..
            } if state.security == SecurityState::KeySent => {
                state.failed_attempts += 1;
                state.seed.clear();
                if state.failed_attempts >= limit {
                    state.security = SecurityState::LockedOut;
                    warn!(attempts = state.failed_attempts, limit, "Security access locked out");
                    DiagError::LockedOut
                } else {
                    state.security = SecurityState::Denied;
                    warn!(attempts = state.failed_attempts, limit, "Security key rejected");
                    DiagError::SecurityDenied {
                        attempts: state.failed_attempts,
                        limit,
                    }
                }
            }
            _ => {
                state.relock();
                error
            }
        }
    }

    fn start_keepalive(&self) {
        let mut keepalive = self.keepalive.lock();
        if let Some(previous) = keepalive.take() {
            previous.stop();
        }
        if self.config.keepalive.enabled {
            *keepalive = Some(Keepalive::start(
                self.link.clone(),
                self.address.tx_id,
                &self.config.keepalive,
                &self.shutdown,
            ));
        }
    }

    fn stop_keepalive(&self) {
        if let Some(keepalive) = self.keepalive.lock().take() {
            keepalive.stop();
        }
    }

    fn reset_session(&self) {
        self.stop_keepalive();
        self.state.lock().reset();
    }

    fn on_link_down(&self, state: ConnectionState) {
        let active = self.state.lock().phase != SessionPhase::Idle;
        self.pending.cancel();
        self.reset_session();
        if active {
            info!(state = %state, "Link down, diagnostic session dropped");
        }
    }

    /// Route ECU responses to the pending slot and watch the link state
    async fn dispatch(
        self: Arc<Self>,
        mut frames: broadcast::Receiver<BusFrame>,
        mut events: broadcast::Receiver<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = next_frame(&mut frames) => {
                    let Some(frame) = frame else { break };
                    if let Some(data) = response_payload(&frame, self.address.rx_id) {
                        if !self.pending.offer(data) {
                            trace!(data = %hex::encode_upper(data), "Unsolicited ECU frame");
                        }
                    }
                }
                event = events.recv() => match event {
                    // A stale event from before a reconnect must not drop a new session
                    Ok(TransportEvent::StateChanged { state, .. })
                        if !state.is_connected() && !self.link.state().is_connected() =>
                    {
                        self.on_link_down(state);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Engine lagged behind transport events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Diagnostic dispatcher stopped");
    }
}

/// Payload of a frame received from the ECU response id
fn response_payload(frame: &BusFrame, rx_id: CanId) -> Option<&[u8]> {
    if frame.direction() != Direction::Rx || frame.data().is_empty() {
        return None;
    }
    match frame {
        BusFrame::Can(f) if f.id() == rx_id => Some(f.data()),
        BusFrame::Lin(f) if u32::from(f.pid().frame_id()) == rx_id.raw() => Some(f.data()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::MockFrameLink;
    use pretty_assertions::assert_eq;

    fn ids() -> (CanId, CanId) {
        (CanId::standard(0x7E0).unwrap(), CanId::standard(0x7E8).unwrap())
    }

    fn config() -> SessionConfig {
        let mut config = SessionConfig {
            request_timeout_ms: 200,
            ..SessionConfig::default()
        };
        config.keepalive.enabled = false;
        config
    }

    fn setup_with(config: SessionConfig) -> (Arc<MockFrameLink>, DiagnosticEngine) {
        let (tx, rx) = ids();
        let link = Arc::new(MockFrameLink::new(tx, rx));
        link.add_response(vec![0x27, 0x01], vec![0x67, 0x01, 0xAA, 0xBB]);
        link.add_response(vec![0x27, 0x02], vec![0x7F, 0x27, 0x35]);
        link.add_response(vec![0x27, 0x02, 0x55, 0x44], vec![0x67, 0x02]);
        let engine = DiagnosticEngine::new(link.clone(), config, DidTable::builtin()).unwrap();
        (link, engine)
    }

    fn setup() -> (Arc<MockFrameLink>, DiagnosticEngine) {
        setup_with(config())
    }

    #[tokio::test]
    async fn test_session_then_unlock() {
        let (link, engine) = setup();
        assert_eq!(engine.phase(), SessionPhase::Idle);

        engine.start_session(0x03).await.unwrap();
        assert_eq!(engine.phase(), SessionPhase::SessionActive);
        assert_eq!(engine.session_type(), Some(0x03));

        let seed = engine.request_seed(0x01).await.unwrap();
        assert_eq!(seed, vec![0xAA, 0xBB]);
        assert_eq!(engine.security_state(), SecurityState::SeedHeld);
        assert_eq!(engine.seed(), Some(vec![0xAA, 0xBB]));

        engine.send_key(&[0x55, 0x44]).await.unwrap();
        assert_eq!(engine.security_state(), SecurityState::Unlocked);
        assert!(matches!(
            engine.send_key(&[0x55, 0x44]).await,
            Err(DiagError::InvalidState(_))
        ));

        assert_eq!(
            link.sent(),
            vec![
                vec![0x10, 0x03],
                vec![0x27, 0x01],
                vec![0x27, 0x02, 0x55, 0x44],
            ]
        );
    }

    #[tokio::test]
    async fn test_seed_requires_session() {
        let (link, engine) = setup();
        assert!(matches!(
            engine.request_seed(0x01).await,
            Err(DiagError::InvalidState(_))
        ));
        assert!(matches!(
            engine.request_seed(0x02).await,
            Err(DiagError::InvalidArgument(_))
        ));
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_key_requires_seed() {
        let (_link, engine) = setup();
        engine.start_session(0x03).await.unwrap();
        assert!(matches!(
            engine.send_key(&[0x00]).await,
            Err(DiagError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_keys_lock_out() {
        let (_link, engine) = setup();
        engine.start_session(0x03).await.unwrap();

        for attempt in 1..=2 {
            engine.request_seed(0x01).await.unwrap();
            match engine.send_key(&[0x00, 0x00]).await {
                Err(DiagError::SecurityDenied { attempts, limit }) => {
                    assert_eq!(attempts, attempt);
                    assert_eq!(limit, 3);
                }
                other => panic!("expected SecurityDenied, got {other:?}"),
            }
            assert_eq!(engine.security_state(), SecurityState::Denied);
        }

        engine.request_seed(0x01).await.unwrap();
        let err = engine.send_key(&[0x00, 0x00]).await.unwrap_err();
        assert!(matches!(err, DiagError::LockedOut));
        assert!(!err.is_retryable());
        assert_eq!(engine.security_state(), SecurityState::LockedOut);
        assert_eq!(engine.failed_attempts(), 3);

        assert!(matches!(engine.request_seed(0x01).await, Err(DiagError::LockedOut)));
        engine.start_session(0x03).await.unwrap();
        assert_eq!(engine.security_state(), SecurityState::LockedOut);
    }

    #[tokio::test]
    async fn test_ecu_lockout_nrc() {
        let (link, engine) = setup();
        link.add_response(vec![0x27, 0x02], vec![0x7F, 0x27, 0x36]);
        engine.start_session(0x03).await.unwrap();
        engine.request_seed(0x01).await.unwrap();
        assert!(matches!(
            engine.send_key(&[0x01, 0x02]).await,
            Err(DiagError::LockedOut)
        ));
        assert_eq!(engine.security_state(), SecurityState::LockedOut);
    }

    #[tokio::test]
    async fn test_zero_seed_means_unlocked() {
        let (link, engine) = setup();
        link.add_response(vec![0x27, 0x03], vec![0x67, 0x03, 0x00, 0x00]);
        engine.start_session(0x03).await.unwrap();
        assert_eq!(engine.request_seed(0x03).await.unwrap(), vec![0x00, 0x00]);
        assert_eq!(engine.security_state(), SecurityState::Unlocked);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let (link, engine) = setup();
        link.add_responses(vec![0x10, 0x02], vec![]);
        match engine.start_session(0x02).await {
            Err(DiagError::Timeout { timeout_ms }) => assert_eq!(timeout_ms, 200),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(engine.phase(), SessionPhase::Idle);
        assert!(engine.pending_request().is_none());
    }

    #[tokio::test]
    async fn test_response_pending_extends_deadline() {
        let (tx, rx) = ids();
        let link = Arc::new(MockFrameLink::new(tx, rx).with_latency(Duration::from_millis(150)));
        link.add_responses(
            vec![0x31, 0x01],
            vec![vec![0x7F, 0x31, 0x78], vec![0x71, 0x01, 0xFF, 0x00]],
        );
        let engine = DiagnosticEngine::new(link.clone(), config(), DidTable::builtin()).unwrap();
        let response = engine
            .send_diagnostic_request(0x31, &[0x01, 0xFF, 0x00])
            .await
            .unwrap();
        assert_eq!(response, vec![0x71, 0x01, 0xFF, 0x00]);
    }

    #[tokio::test]
    async fn test_negative_response() {
        let (link, engine) = setup();
        link.add_response(vec![0x22, 0x12, 0x34], vec![0x7F, 0x22, 0x31]);
        match engine.read_did(0x1234).await {
            Err(DiagError::NegativeResponse { service_id, nrc }) => {
                assert_eq!(service_id, 0x22);
                assert_eq!(nrc, NegativeResponseCode::RequestOutOfRange);
            }
            other => panic!("expected negative response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let (link, engine) = setup();
        let err = engine
            .send_diagnostic_request(0x2E, &[0xF1, 0x90, 1, 2, 3, 4, 5, 6])
            .await
            .unwrap_err();
        assert!(matches!(err, DiagError::InvalidArgument(_)));
        assert!(link.sent().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_request() {
        let (tx, rx) = ids();
        let link = Arc::new(MockFrameLink::new(tx, rx).with_latency(Duration::from_millis(50)));
        let engine = Arc::new(
            DiagnosticEngine::new(link.clone(), config(), DidTable::builtin()).unwrap(),
        );

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send_diagnostic_request(0x22, &[0xF1, 0xA0]).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = engine.send_diagnostic_request(0x19, &[0x02, 0xFF]).await;

        assert!(matches!(first.await.unwrap(), Err(DiagError::Superseded)));
        assert_eq!(second.unwrap()[0], 0x59);
    }

    #[tokio::test]
    async fn test_read_did_and_dtcs() {
        let (_link, engine) = setup();
        let reading = engine.read_did(0xF1A0).await.unwrap();
        assert_eq!(reading.name, "Odometer");
        assert_eq!(reading.value, "123456");

        let dtcs = engine.read_dtcs(0xFF).await.unwrap();
        assert_eq!(dtcs.len(), 1);
        assert_eq!(dtcs[0].code, "P0100");
        assert!(dtcs[0].status.confirmed);

        engine.clear_dtcs().await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_dids() {
        let (_link, engine) = setup();
        let mut table = DidTable::new();
        table.register(0xF1A0, "Mileage", busdiag_conv::DidDecoder::uint(4).unwrap());
        engine.reload_dids(table);
        assert_eq!(engine.read_did(0xF1A0).await.unwrap().name, "Mileage");
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let (_link, engine) = setup();
        engine.start_session(0x03).await.unwrap();
        engine.request_seed(0x01).await.unwrap();
        engine.send_key(&[0x55, 0x44]).await.unwrap();

        engine.ecu_reset(ResetKind::Soft).await.unwrap();
        assert_eq!(engine.phase(), SessionPhase::Idle);
        assert_eq!(engine.security_state(), SecurityState::Locked);
    }

    #[tokio::test]
    async fn test_key_off_on_reset() {
        let (link, engine) = setup();
        engine.start_session(0x03).await.unwrap();
        engine.ecu_reset(ResetKind::KeyOffOn).await.unwrap();
        assert_eq!(link.sent_count(&[0x11, 0x02]), 1);
        assert_eq!(engine.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_keepalive_follows_session() {
        let mut config = config();
        config.keepalive.enabled = true;
        config.keepalive.interval_ms = 20;
        let (link, engine) = setup_with(config);

        engine.start_session(0x03).await.unwrap();
        assert!(engine.keepalive_running());
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(link.sent_count(&[0x3E, 0x80]) >= 3);

        engine.end_session();
        assert!(!engine.keepalive_running());
        let sent = link.sent_count(&[0x3E]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(link.sent_count(&[0x3E]), sent);
    }

    #[tokio::test]
    async fn test_link_down_drops_session() {
        let mut config = config();
        config.keepalive.enabled = true;
        let (link, engine) = setup_with(config);
        engine.start_session(0x03).await.unwrap();

        link.set_connected(false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.phase(), SessionPhase::Idle);
        assert!(!engine.keepalive_running());
        assert!(matches!(
            engine.start_session(0x03).await,
            Err(DiagError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_annotate() {
        let (_link, engine) = setup();
        let frame = busdiag_core::Frame::new(ids().1, vec![0x7F, 0x27, 0x35], Direction::Rx)
            .unwrap();
        assert_eq!(
            engine.annotate(&frame.into()).unwrap(),
            "Negative Response → SID: 27, Invalid Key"
        );
    }

    #[test]
    fn test_response_payload_filter() {
        let (tx, rx) = ids();
        let frame = |id, dir| -> BusFrame {
            busdiag_core::Frame::new(id, vec![0x50, 0x03], dir).unwrap().into()
        };
        assert!(response_payload(&frame(rx, Direction::Rx), rx).is_some());
        assert!(response_payload(&frame(rx, Direction::Tx), rx).is_none());
        assert!(response_payload(&frame(tx, Direction::Rx), rx).is_none());
    }
}
