//! Tool configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a working simulation setup.
//!
//! ```toml
//! dids = "dids.json"
//!
//! [connection]
//! dialect = "slcan"
//! bitrate = 500000
//!
//! [connection.endpoint]
//! type = "serial"
//! port = "/dev/ttyACM0"
//!
//! [session]
//! tx_id = 0x7E0
//! rx_id = 0x7E8
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use busdiag_core::{CanBitrate, Dialect, MAX_CLASSIC_PAYLOAD};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusDiagConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// External DID table (JSON, YAML or TOML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dids: Option<PathBuf>,
}

impl BusDiagConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let conn = &self.connection;
        if conn.max_payload == 0 || conn.max_payload > MAX_CLASSIC_PAYLOAD {
            return Err(ConfigError::Invalid(format!(
                "max_payload must be 1..={}, got {}",
                MAX_CLASSIC_PAYLOAD, conn.max_payload
            )));
        }
        if conn.can_bitrate().is_none() {
            return Err(ConfigError::Invalid(format!(
                "unsupported bitrate {} bit/s",
                conn.bitrate
            )));
        }
        let sim = &self.simulation;
        if sim.id_min > sim.id_max || sim.id_max > 0x7FF {
            return Err(ConfigError::Invalid(format!(
                "simulation id range 0x{:X}..=0x{:X} must lie within 0..=0x7FF",
                sim.id_min, sim.id_max
            )));
        }
        if sim.secret.is_empty() {
            return Err(ConfigError::Invalid("simulation secret is empty".to_string()));
        }
        if self.session.keepalive.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "keepalive interval must be greater than zero".to_string(),
            ));
        }
        if self.session.max_key_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_key_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Connection
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub dialect: Dialect,
    /// CAN bitrate in bit/s
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
    /// Sleep between empty reads of the background reader
    #[serde(default = "default_read_poll")]
    pub read_poll_ms: u64,
    /// Upper bound on waiting for the reader thread during disconnect
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    pub fn can_bitrate(&self) -> Option<CanBitrate> {
        CanBitrate::from_bps(self.bitrate)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            dialect: Dialect::default(),
            bitrate: default_bitrate(),
            max_payload: default_max_payload(),
            read_poll_ms: default_read_poll(),
            join_timeout_ms: default_join_timeout(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn default_bitrate() -> u32 {
    500000
}

fn default_max_payload() -> usize {
    MAX_CLASSIC_PAYLOAD
}

fn default_read_poll() -> u64 {
    1
}

fn default_join_timeout() -> u64 {
    2000
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EndpointConfig {
    /// Physical adapter on a serial port
    Serial(SerialConfig),
    /// In-process simulated adapter
    Simulation,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::Simulation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g. /dev/ttyACM0, COM3)
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115200
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    10000
}

// =============================================================================
// Simulation
// =============================================================================

/// Simulated adapter and the ECU behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Period of random background traffic
    #[serde(default = "default_sim_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_id_min")]
    pub id_min: u32,
    #[serde(default = "default_id_max")]
    pub id_max: u32,
    /// Seed handed out for every seed request
    #[serde(default = "default_seed")]
    pub seed: Vec<u8>,
    /// XOR secret the ECU checks keys against
    #[serde(default = "default_secret")]
    pub secret: Vec<u8>,
    /// Invalid keys the ECU tolerates before answering NRC 0x36
    #[serde(default = "default_ecu_attempts")]
    pub max_key_attempts: u32,
    #[serde(default = "default_ecu_delay")]
    pub ecu_response_delay_ms: u64,
    /// Emit random background frames
    #[serde(default = "default_true")]
    pub traffic: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sim_interval(),
            id_min: default_id_min(),
            id_max: default_id_max(),
            seed: default_seed(),
            secret: default_secret(),
            max_key_attempts: default_ecu_attempts(),
            ecu_response_delay_ms: default_ecu_delay(),
            traffic: default_true(),
        }
    }
}

fn default_sim_interval() -> u64 {
    1000
}

fn default_id_min() -> u32 {
    0x100
}

fn default_id_max() -> u32 {
    0x7FF
}

fn default_seed() -> Vec<u8> {
    vec![0xAA, 0xBB]
}

fn default_secret() -> Vec<u8> {
    vec![0xFF]
}

fn default_ecu_attempts() -> u32 {
    3
}

fn default_ecu_delay() -> u64 {
    5
}

// =============================================================================
// Session
// =============================================================================

/// Diagnostic session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Request id (tester -> ECU)
    #[serde(default = "default_tx_id")]
    pub tx_id: u32,
    /// Response id (ECU -> tester)
    #[serde(default = "default_rx_id")]
    pub rx_id: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Invalid keys tolerated before the engine reports lockout
    #[serde(default = "default_key_attempts")]
    pub max_key_attempts: u32,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tx_id: default_tx_id(),
            rx_id: default_rx_id(),
            request_timeout_ms: default_request_timeout(),
            max_key_attempts: default_key_attempts(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

fn default_tx_id() -> u32 {
    0x7E0
}

fn default_rx_id() -> u32 {
    0x7E8
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_key_attempts() -> u32 {
    3
}

/// Tester present keepalive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keepalive_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_true")]
    pub suppress_response: bool,
}

impl KeepaliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_ms: default_keepalive_interval(),
            suppress_response: default_true(),
        }
    }
}

fn default_keepalive_interval() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BusDiagConfig::from_toml("").unwrap();
        assert_eq!(config.connection.endpoint, EndpointConfig::Simulation);
        assert_eq!(config.connection.dialect, Dialect::Csv);
        assert_eq!(config.connection.bitrate, 500000);
        assert_eq!(config.connection.reconnect.max_attempts, 5);
        assert_eq!(config.simulation.seed, vec![0xAA, 0xBB]);
        assert_eq!(config.session.tx_id, 0x7E0);
        assert_eq!(config.session.rx_id, 0x7E8);
        assert_eq!(config.session.keepalive.interval_ms, 2000);
        assert!(config.dids.is_none());
    }

    #[test]
    fn test_serial_endpoint() {
        let config = BusDiagConfig::from_toml(
            r#"
            dids = "dids.yaml"

            [connection]
            dialect = "slcan"
            bitrate = 250000

            [connection.endpoint]
            type = "serial"
            port = "/dev/ttyACM0"

            [session.keepalive]
            interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(
            config.connection.endpoint,
            EndpointConfig::Serial(SerialConfig {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: 115200,
            })
        );
        assert_eq!(config.connection.dialect, Dialect::Slcan);
        assert_eq!(config.connection.can_bitrate(), Some(CanBitrate::Kbit250));
        assert_eq!(config.session.keepalive.interval_ms, 500);
        assert!(config.session.keepalive.enabled);
        assert_eq!(config.dids, Some(PathBuf::from("dids.yaml")));
    }

    #[test]
    fn test_validation() {
        let invalid = [
            "[connection]\nbitrate = 300000",
            "[connection]\nmax_payload = 9",
            "[simulation]\nid_min = 0x700\nid_max = 0x100",
            "[simulation]\nid_max = 0x800",
            "[session.keepalive]\ninterval_ms = 0",
            "[session]\nmax_key_attempts = 0",
        ];
        for content in invalid {
            assert!(
                matches!(BusDiagConfig::from_toml(content), Err(ConfigError::Invalid(_))),
                "{content}"
            );
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busdiag.toml");
        std::fs::write(&path, "[simulation]\ntraffic = false\n").unwrap();
        let config = BusDiagConfig::from_file(&path).unwrap();
        assert!(!config.simulation.traffic);
        assert!(matches!(
            BusDiagConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
