//! Mock frame link for testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use busdiag_core::{BusFrame, CanId, Direction, Frame};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use super::{ConnectionState, FrameLink, TransportError, TransportEvent};
use crate::bus::FrameBus;

/// In-memory ECU stand-in answering requests from a response table
///
/// Each sent frame is matched against the table (exact match first, then
/// prefix). A matching entry may answer with several frames, or none at all
/// to simulate a silent ECU. Requests with no entry get the bare positive
/// response `sid + 0x40`.
pub struct MockFrameLink {
    tx_id: CanId,
    rx_id: CanId,
    latency: Duration,
    connected: AtomicBool,
    bus: FrameBus,
    events: broadcast::Sender<TransportEvent>,
    responses: RwLock<Vec<(Vec<u8>, Vec<Vec<u8>>)>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockFrameLink {
    pub fn new(tx_id: CanId, rx_id: CanId) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            tx_id,
            rx_id,
            latency: Duration::ZERO,
            connected: AtomicBool::new(true),
            bus: FrameBus::default(),
            events,
            responses: RwLock::new(Self::default_responses()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add a response; later entries do not override earlier exact matches
    pub fn add_response(&self, request: Vec<u8>, response: Vec<u8>) {
        self.add_responses(request, vec![response]);
    }

    /// Answer `request` with a sequence of frames (empty for silence)
    pub fn add_responses(&self, request: Vec<u8>, responses: Vec<Vec<u8>>) {
        self.responses.write().insert(0, (request, responses));
    }

    /// Inject a received frame (simulates unsolicited ECU traffic)
    pub fn inject(&self, id: CanId, data: Vec<u8>) {
        if let Ok(frame) = Frame::new(id, data, Direction::Rx) {
            self.bus.publish(frame);
        }
    }

    pub fn emit_event(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Set connection state; a change is announced as a state event
    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            self.emit_event(TransportEvent::StateChanged {
                state: self.state(),
                message: None,
            });
        }
    }

    /// Payloads sent so far, oldest first
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self, prefix: &[u8]) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|data| data.starts_with(prefix))
            .count()
    }

    pub fn bus(&self) -> &FrameBus {
        &self.bus
    }

    fn default_responses() -> Vec<(Vec<u8>, Vec<Vec<u8>>)> {
        vec![
            // DiagnosticSessionControl - Extended (0x10 03 -> 0x50 03)
            (
                vec![0x10, 0x03],
                vec![vec![0x50, 0x03, 0x00, 0x19, 0x01, 0xF4]],
            ),
            // Tester Present
            (vec![0x3E, 0x00], vec![vec![0x7E, 0x00]]),
            // Tester Present, suppress positive response
            (vec![0x3E, 0x80], vec![]),
            // ReadDataByIdentifier - odometer
            (
                vec![0x22, 0xF1, 0xA0],
                vec![vec![0x62, 0xF1, 0xA0, 0x00, 0x01, 0xE2, 0x40]],
            ),
            // ReadDTCInformation - one DTC, P0100 test failed + confirmed
            (
                vec![0x19, 0x02],
                vec![vec![0x59, 0x02, 0xFF, 0x01, 0x00, 0x09]],
            ),
        ]
    }

    fn find_responses(&self, request: &[u8]) -> Vec<Vec<u8>> {
        let responses = self.responses.read();

        if let Some((_, resp)) = responses.iter().find(|(req, _)| req == request) {
            return resp.clone();
        }
        if let Some((_, resp)) = responses.iter().find(|(req, _)| request.starts_with(req)) {
            return resp.clone();
        }

        match request.first() {
            Some(sid) => vec![vec![sid.wrapping_add(0x40)]],
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl FrameLink for MockFrameLink {
    async fn send_frame(&self, id: CanId, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        self.sent.lock().push(data.to_vec());
        self.bus.publish(Frame::new(id, data.to_vec(), Direction::Tx)?);
        tracing::debug!(request = %hex::encode_upper(data), "Mock link: sent frame");

        if id != self.tx_id {
            return Ok(());
        }

        let responses = self.find_responses(data);
        if responses.is_empty() {
            return Ok(());
        }
        let bus = self.bus.clone();
        let rx_id = self.rx_id;
        let latency = self.latency;
        tokio::spawn(async move {
            for response in responses {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                match Frame::new(rx_id, response, Direction::Rx) {
                    Ok(frame) => {
                        bus.publish(frame);
                    }
                    Err(e) => tracing::warn!(error = %e, "Mock response does not fit a frame"),
                }
            }
        });
        Ok(())
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<BusFrame> {
        self.bus.subscribe()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::next_frame;

    fn link() -> MockFrameLink {
        MockFrameLink::new(CanId::standard(0x7E0).unwrap(), CanId::standard(0x7E8).unwrap())
    }

    async fn next_rx(rx: &mut broadcast::Receiver<BusFrame>) -> Vec<u8> {
        loop {
            let frame = next_frame(rx).await.unwrap();
            if frame.direction() == Direction::Rx {
                return frame.data().to_vec();
            }
        }
    }

    #[tokio::test]
    async fn test_table_and_default_responses() {
        let link = link();
        let mut rx = link.subscribe_frames();
        let tx_id = CanId::standard(0x7E0).unwrap();

        link.send_frame(tx_id, &[0x10, 0x03]).await.unwrap();
        assert_eq!(next_rx(&mut rx).await, vec![0x50, 0x03, 0x00, 0x19, 0x01, 0xF4]);

        link.send_frame(tx_id, &[0x11, 0x01]).await.unwrap();
        assert_eq!(next_rx(&mut rx).await, vec![0x51]);
        assert_eq!(link.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_added_response_takes_precedence() {
        let link = link();
        link.add_responses(vec![0x10, 0x03], vec![vec![0x7F, 0x10, 0x78], vec![0x50, 0x03]]);
        let mut rx = link.subscribe_frames();

        link.send_frame(CanId::standard(0x7E0).unwrap(), &[0x10, 0x03])
            .await
            .unwrap();
        assert_eq!(next_rx(&mut rx).await, vec![0x7F, 0x10, 0x78]);
        assert_eq!(next_rx(&mut rx).await, vec![0x50, 0x03]);
    }

    #[tokio::test]
    async fn test_disconnected_link_rejects_send() {
        let link = link();
        let mut events = link.subscribe_events();
        link.set_connected(false);
        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::StateChanged {
                state: ConnectionState::Disconnected,
                ..
            }
        ));
        let result = link
            .send_frame(CanId::standard(0x7E0).unwrap(), &[0x3E, 0x00])
            .await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
