//! Single-slot request correlation

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::transport::TransportError;
use crate::uds::{positive_response_id, service_id, DiagError};

/// The one outstanding diagnostic request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub service_id: u8,
    pub sent_at: Instant,
    pub timeout: Duration,
    pub correlation_key: u64,
}

impl PendingRequest {
    /// Positive response `sid + 0x40`, or a negative response naming `sid`
    pub fn matches(&self, data: &[u8]) -> bool {
        match data {
            [sid, ..] if *sid == positive_response_id(self.service_id) => true,
            [service_id::NEGATIVE_RESPONSE, sid, ..] => *sid == self.service_id,
            _ => false,
        }
    }
}

pub(crate) type Delivery = Result<Vec<u8>, DiagError>;

struct Slot {
    request: PendingRequest,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Holds at most one pending request
///
/// Installing a request supersedes the previous one, whose waiter is told
/// so. Matching responses are forwarded without clearing the slot, since a
/// response-pending answer may be followed by the final one.
#[derive(Default)]
pub(crate) struct PendingSlot {
    slot: Mutex<Option<Slot>>,
    next_key: AtomicU64,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(
        &self,
        service_id: u8,
        timeout: Duration,
    ) -> (u64, mpsc::UnboundedReceiver<Delivery>) {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.slot.lock().replace(Slot {
            request: PendingRequest {
                service_id,
                sent_at: Instant::now(),
                timeout,
                correlation_key: key,
            },
            tx,
        });
        if let Some(previous) = previous {
            tracing::debug!(
                service_id = format!("0x{:02X}", previous.request.service_id),
                "Pending request superseded"
            );
            let _ = previous.tx.send(Err(DiagError::Superseded));
        }
        (key, rx)
    }

    /// Forward a received payload; returns whether the pending request took it
    pub fn offer(&self, data: &[u8]) -> bool {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(slot) if slot.request.matches(data) => slot.tx.send(Ok(data.to_vec())).is_ok(),
            _ => false,
        }
    }

    /// Release the slot if it still holds the request with this key
    pub fn finish(&self, key: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|s| s.request.correlation_key) == Some(key) {
            *slot = None;
        }
    }

    /// Fail whatever is pending because the link went away
    pub fn cancel(&self) {
        if let Some(slot) = self.slot.lock().take() {
            let _ = slot
                .tx
                .send(Err(DiagError::Transport(TransportError::NotConnected)));
        }
    }

    pub fn current(&self) -> Option<PendingRequest> {
        self.slot.lock().as_ref().map(|s| s.request.clone())
    }
}
