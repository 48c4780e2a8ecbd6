//! Connected adapter plus diagnostic engine

use std::sync::Arc;

use anyhow::{Context, Result};
use busdiag_uds::config::EndpointConfig;
use busdiag_uds::{BusDiagConfig, Connection, DiagnosticEngine, DidTable, FrameBus};
use tracing::debug;

/// Everything a command needs to talk to the bus
pub struct Device {
    pub config: BusDiagConfig,
    pub connection: Arc<Connection>,
    pub engine: DiagnosticEngine,
    pub dids: DidTable,
}

impl Device {
    /// Build the endpoint, attach the engine, then connect
    pub fn open(config: BusDiagConfig) -> Result<Self> {
        let dids = DidTable::load_or_default(config.dids.as_deref());
        let connection = Arc::new(
            Connection::from_config(&config, FrameBus::default())
                .context("Failed to set up connection")?,
        );
        let engine = DiagnosticEngine::new(connection.clone(), config.session.clone(), dids.clone())
            .context("Failed to set up diagnostic engine")?;

        connection
            .connect()
            .with_context(|| format!("Failed to connect to {}", endpoint_name(&config)))?;
        debug!(endpoint = %endpoint_name(&config), address = %engine.address(), "Device ready");

        Ok(Self {
            config,
            connection,
            engine,
            dids,
        })
    }

    pub fn is_simulated(&self) -> bool {
        self.config.connection.endpoint == EndpointConfig::Simulation
    }

    pub fn endpoint_name(&self) -> String {
        endpoint_name(&self.config)
    }
}

fn endpoint_name(config: &BusDiagConfig) -> String {
    match &config.connection.endpoint {
        EndpointConfig::Serial(serial) => serial.port.clone(),
        EndpointConfig::Simulation => "simulation".to_string(),
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.engine.end_session();
        self.connection.disconnect();
    }
}
