//! Tester present keepalive task

use std::sync::Arc;

use busdiag_core::CanId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::KeepaliveConfig;
use crate::transport::{FrameLink, TransportError};
use crate::uds::{service_id, SUPPRESS_POSITIVE_RESPONSE};

/// Sends TesterPresent at a fixed interval until stopped
///
/// Requests bypass the pending slot: they are fire-and-forget and never
/// supersede a request the caller is waiting on.
pub(crate) struct Keepalive {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Keepalive {
    pub fn start(
        link: Arc<dyn FrameLink>,
        tx_id: CanId,
        config: &KeepaliveConfig,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let interval = config.interval();
        let request = if config.suppress_response {
            vec![service_id::TESTER_PRESENT, SUPPRESS_POSITIVE_RESPONSE]
        } else {
            vec![service_id::TESTER_PRESENT, 0x00]
        };

        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        match link.send_frame(tx_id, &request).await {
                            Ok(()) => debug!("Tester present sent"),
                            Err(TransportError::NotConnected) => debug!("Tester present skipped, not connected"),
                            Err(e) => warn!(error = %e, "Tester present send failed"),
                        }
                    }
                }
            }
        });

        debug!(interval_ms = config.interval_ms, "Keepalive started");
        Self { token, handle }
    }

    pub fn stop(self) {
        self.token.cancel();
        debug!("Keepalive stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
