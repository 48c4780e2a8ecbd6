//! Frame fan-out
//!
//! Every decoded frame, received or sent, is published here. Each
//! subscriber gets its own queue, in producer order. A subscriber that
//! falls more than `capacity` frames behind loses the oldest ones and is
//! told how many it missed.

use busdiag_core::BusFrame;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct FrameBus {
    tx: broadcast::Sender<BusFrame>,
}

impl FrameBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers that will see the frame
    pub fn publish(&self, frame: impl Into<BusFrame>) -> usize {
        self.tx.send(frame.into()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusFrame> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream; lag is logged and skipped over
    pub fn stream(&self) -> impl Stream<Item = BusFrame> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "Frame subscriber lagged");
                None
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receive the next frame, skipping over lag; `None` once the bus is gone
pub async fn next_frame(rx: &mut broadcast::Receiver<BusFrame>) -> Option<BusFrame> {
    loop {
        match rx.recv().await {
            Ok(frame) => return Some(frame),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Frame subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
