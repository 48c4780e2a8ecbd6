//! Simulated adapter
//!
//! Stands in for a serial adapter when no hardware is attached. Each open
//! powers up a fresh [`SimulatedEcu`], so reopening clears a lockout the
//! way a power cycle would.

mod ecu;
mod port;
mod traffic;

use std::time::Duration;

use busdiag_core::{CanId, LineCodec};

pub use ecu::{negative_response, positive_response, SimulatedEcu};
pub use port::SimulatedPort;
pub use traffic::TrafficGenerator;

use crate::config::{SessionConfig, SimulationConfig};
use crate::transport::{Connector, StreamHandle, TransportError};

pub struct SimulatedConnector {
    config: SimulationConfig,
    codec: LineCodec,
    tx_id: CanId,
    rx_id: CanId,
}

impl SimulatedConnector {
    pub fn new(
        config: &SimulationConfig,
        session: &SessionConfig,
        codec: LineCodec,
    ) -> Result<Self, TransportError> {
        let id = |raw: u32| {
            CanId::from_raw(raw).map_err(|e| {
                TransportError::InvalidConfig(format!("simulated ECU id 0x{:X}: {}", raw, e))
            })
        };
        Ok(Self {
            config: config.clone(),
            codec,
            tx_id: id(session.tx_id)?,
            rx_id: id(session.rx_id)?,
        })
    }
}

impl Connector for SimulatedConnector {
    fn open(&self) -> Result<Box<dyn StreamHandle>, TransportError> {
        let max_payload = self.codec.max_payload();
        let traffic = self.config.traffic.then(|| {
            TrafficGenerator::new(
                &self.config,
                self.rx_id.raw(),
                self.codec.dialect(),
                max_payload,
            )
        });
        tracing::info!(
            tx_id = %self.tx_id,
            rx_id = %self.rx_id,
            dialect = ?self.codec.dialect(),
            traffic = self.config.traffic,
            "Simulated adapter powered up"
        );
        Ok(Box::new(SimulatedPort::new(
            self.codec,
            SimulatedEcu::new(&self.config, max_payload),
            traffic,
            Duration::from_millis(self.config.interval_ms.max(1)),
            Duration::from_millis(self.config.ecu_response_delay_ms),
            self.tx_id,
            self.rx_id,
        )))
    }

    fn describe(&self) -> String {
        "simulation".to_string()
    }
}
