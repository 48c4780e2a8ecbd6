//! Frame link trait

use async_trait::async_trait;
use busdiag_core::{BusFrame, CanId, MAX_CLASSIC_PAYLOAD};
use tokio::sync::broadcast;

use super::{ConnectionState, TransportError, TransportEvent};

/// What the diagnostic engine needs from a connection
///
/// This trait abstracts the underlying endpoint (serial adapter,
/// simulation, test mock) behind whole-frame send and subscribe.
#[async_trait]
pub trait FrameLink: Send + Sync {
    /// Send one frame in the transmit direction
    async fn send_frame(&self, id: CanId, data: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to every frame seen on the link, both directions
    fn subscribe_frames(&self) -> broadcast::Receiver<BusFrame>;

    /// Subscribe to connection state changes and errors
    fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent>;

    fn state(&self) -> ConnectionState;

    /// Largest payload one frame can carry on this link
    fn max_payload(&self) -> usize {
        MAX_CLASSIC_PAYLOAD
    }
}
