//! Configuration file lookup and command-line overrides

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use busdiag_core::Dialect;
use busdiag_uds::config::{EndpointConfig, SerialConfig};
use busdiag_uds::BusDiagConfig;

const DEFAULT_BAUD_RATE: u32 = 115200;

/// Connection settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub dialect: Option<Dialect>,
    pub bitrate: Option<u32>,
    pub simulate: bool,
    pub tx_id: Option<u32>,
    pub rx_id: Option<u32>,
    pub dids: Option<PathBuf>,
}

/// Load the configuration from `path`, or from the default location
///
/// A missing default file yields the built-in defaults (simulation).
pub fn load(path: Option<&Path>) -> Result<BusDiagConfig> {
    if let Some(path) = path {
        return BusDiagConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()));
    }
    match default_path() {
        Some(path) if path.exists() => BusDiagConfig::from_file(&path)
            .with_context(|| format!("Failed to load config file: {}", path.display())),
        _ => Ok(BusDiagConfig::default()),
    }
}

/// `<config dir>/busdiag/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("busdiag").join("config.toml"))
}

impl Overrides {
    /// Apply the overrides on top of file values and re-validate
    pub fn apply(&self, mut config: BusDiagConfig) -> Result<BusDiagConfig> {
        let conn = &mut config.connection;

        if self.simulate {
            conn.endpoint = EndpointConfig::Simulation;
        } else if let Some(port) = &self.port {
            let baud_rate = match (&conn.endpoint, self.baud) {
                (_, Some(baud)) => baud,
                (EndpointConfig::Serial(serial), None) => serial.baud_rate,
                (EndpointConfig::Simulation, None) => DEFAULT_BAUD_RATE,
            };
            conn.endpoint = EndpointConfig::Serial(SerialConfig {
                port: port.clone(),
                baud_rate,
            });
        } else if let (EndpointConfig::Serial(serial), Some(baud)) = (&mut conn.endpoint, self.baud) {
            serial.baud_rate = baud;
        }

        if let Some(dialect) = self.dialect {
            conn.dialect = dialect;
        }
        if let Some(bitrate) = self.bitrate {
            conn.bitrate = bitrate;
        }
        if let Some(tx_id) = self.tx_id {
            config.session.tx_id = tx_id;
        }
        if let Some(rx_id) = self.rx_id {
            config.session.rx_id = rx_id;
        }
        if let Some(dids) = &self.dids {
            config.dids = Some(dids.clone());
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_without_overrides() {
        let config = Overrides::default().apply(BusDiagConfig::default()).unwrap();
        assert_eq!(config.connection.endpoint, EndpointConfig::Simulation);
        assert_eq!(config.session.tx_id, 0x7E0);
        assert_eq!(config.session.rx_id, 0x7E8);
    }

    #[test]
    fn test_port_selects_serial() {
        let overrides = Overrides {
            port: Some("/dev/ttyACM0".to_string()),
            dialect: Some(Dialect::Slcan),
            bitrate: Some(250000),
            tx_id: Some(0x7E1),
            rx_id: Some(0x7E9),
            ..Overrides::default()
        };
        let config = overrides.apply(BusDiagConfig::default()).unwrap();
        assert_eq!(
            config.connection.endpoint,
            EndpointConfig::Serial(SerialConfig {
                port: "/dev/ttyACM0".to_string(),
                baud_rate: 115200,
            })
        );
        assert_eq!(config.connection.dialect, Dialect::Slcan);
        assert_eq!(config.connection.bitrate, 250000);
        assert_eq!(config.session.tx_id, 0x7E1);
        assert_eq!(config.session.rx_id, 0x7E9);
    }

    #[test]
    fn test_simulate_wins_over_file_port() {
        let file = BusDiagConfig::from_toml(
            r#"
            [connection.endpoint]
            type = "serial"
            port = "COM3"
            baud_rate = 921600
            "#,
        )
        .unwrap();

        let baud_only = Overrides {
            baud: Some(57600),
            ..Overrides::default()
        };
        let config = baud_only.apply(file.clone()).unwrap();
        assert_eq!(
            config.connection.endpoint,
            EndpointConfig::Serial(SerialConfig {
                port: "COM3".to_string(),
                baud_rate: 57600,
            })
        );

        let simulate = Overrides {
            simulate: true,
            port: Some("COM4".to_string()),
            ..Overrides::default()
        };
        let config = simulate.apply(file).unwrap();
        assert_eq!(config.connection.endpoint, EndpointConfig::Simulation);
    }

    #[test]
    fn test_invalid_bitrate_rejected() {
        let overrides = Overrides {
            bitrate: Some(123),
            ..Overrides::default()
        };
        assert!(overrides.apply(BusDiagConfig::default()).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\ndialect = \"mcp2515\"").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.connection.dialect, Dialect::Mcp2515);

        assert!(load(Some(Path::new("/nonexistent/busdiag.toml"))).is_err());
    }
}
