//! busdiag - command-line tool for serial CAN/LIN adapters
//!
//! Monitors bus traffic and runs UDS diagnostics (sessions, security
//! access, DID and DTC reads) against a real adapter or the built-in
//! simulation.

mod commands;
mod config;
mod device;
mod output;
mod parse;

use std::path::PathBuf;

use anyhow::Result;
use busdiag_core::Dialect;
use busdiag_uds::ResetKind;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::unlock::KeySource;
use crate::config::Overrides;
use crate::device::Device;
use crate::output::{OutputContext, OutputFormat};
use crate::parse::{
    parse_dialect, parse_hex_bytes, parse_hex_u16, parse_hex_u32, parse_hex_u8, parse_session_type,
};

#[derive(Parser)]
#[command(name = "busdiag")]
#[command(author, version, about = "Serial CAN/LIN bus monitor and UDS diagnostics")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BUSDIAG_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port of the adapter (selects the serial endpoint)
    #[arg(short, long, env = "BUSDIAG_PORT")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Adapter dialect: slcan, mcp2515, lin, csv
    #[arg(short, long, value_parser = parse_dialect)]
    dialect: Option<Dialect>,

    /// CAN bitrate in bit/s
    #[arg(long)]
    bitrate: Option<u32>,

    /// Use the built-in simulated adapter and ECU
    #[arg(long)]
    simulate: bool,

    /// Diagnostic request id (hex)
    #[arg(long, value_parser = parse_hex_u32)]
    tx_id: Option<u32>,

    /// Diagnostic response id (hex)
    #[arg(long, value_parser = parse_hex_u32)]
    rx_id: Option<u32>,

    /// DID definition file (JSON, YAML or TOML)
    #[arg(long)]
    dids: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Print bus frames until Ctrl+C
    Monitor {
        /// Stop after this many frames
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Describe UDS frames
        #[arg(short, long)]
        annotate: bool,
    },

    /// Send a raw frame
    Send {
        /// Frame id (hex)
        id: String,

        /// Payload (hex, e.g. "02 10 03")
        #[arg(default_value = "")]
        data: String,
    },

    /// Send a diagnostic request and print the response
    Request {
        /// Service id (hex)
        #[arg(value_parser = parse_hex_u8)]
        service: u8,

        /// Request payload after the service id (hex)
        #[arg(default_value = "")]
        payload: String,
    },

    /// Start a diagnostic session
    Session {
        /// Session type: default, programming, extended, or hex
        #[arg(value_name = "TYPE")]
        session_type: String,
    },

    /// Security access (unlock ECU)
    #[command(group(ArgGroup::new("key_source").args(["key", "secret"])))]
    Unlock {
        /// Security level (odd, hex)
        #[arg(long, default_value = "01", value_parser = parse_hex_u8)]
        level: u8,

        /// Session to start first
        #[arg(long, default_value = "extended")]
        session: String,

        /// Security key (hex string, e.g., "5544")
        #[arg(long)]
        key: Option<String>,

        /// XOR secret to derive the key from the seed (hex)
        #[arg(long)]
        secret: Option<String>,
    },

    /// Read data identifiers
    ReadDid {
        /// DIDs to read (hex, e.g. F190)
        #[arg(required = true, value_parser = parse_hex_u16)]
        dids: Vec<u16>,
    },

    /// Read or clear trouble codes
    Dtc {
        /// Status mask (hex)
        #[arg(long, default_value = "FF", value_parser = parse_hex_u8)]
        mask: u8,

        /// Clear all trouble codes
        #[arg(long)]
        clear: bool,
    },

    /// Reset the ECU
    Reset {
        /// Soft reset instead of hard reset
        #[arg(long, conflicts_with = "key_off_on")]
        soft: bool,

        /// Key off/on reset instead of hard reset
        #[arg(long)]
        key_off_on: bool,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port.clone(),
            baud: self.baud,
            dialect: self.dialect,
            bitrate: self.bitrate,
            simulate: self.simulate,
            tx_id: self.tx_id,
            rx_id: self.rx_id,
            dids: self.dids.clone(),
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    // Ports needs no connection
    if let Commands::Ports = cli.command {
        return commands::ports(&ctx);
    }

    let file_config = config::load(cli.config.as_deref())?;
    let merged = cli.overrides().apply(file_config)?;
    let device = Device::open(merged)?;

    match &cli.command {
        Commands::Ports => {}

        Commands::Monitor { count, annotate } => {
            commands::monitor(&device, *count, *annotate, &ctx).await?;
        }

        Commands::Send { id, data } => {
            let data = parse_hex_bytes(data)?;
            commands::send(&device, id, &data, &ctx)?;
        }

        Commands::Request { service, payload } => {
            let payload = parse_hex_bytes(payload)?;
            commands::request(&device, *service, &payload, &ctx).await?;
        }

        Commands::Session { session_type } => {
            let session = parse_session_type(session_type)?;
            commands::session(&device, session, &ctx).await?;
        }

        Commands::Unlock {
            level,
            session,
            key,
            secret,
        } => {
            let session = parse_session_type(session)?;
            let source = match (key, secret) {
                (Some(key), _) => Some(KeySource::Key(parse_hex_bytes(key)?)),
                (None, Some(secret)) => Some(KeySource::Secret(parse_hex_bytes(secret)?)),
                (None, None) => None,
            };
            commands::unlock(&device, session, *level, source, &ctx).await?;
        }

        Commands::ReadDid { dids } => {
            commands::read_did(&device, dids, &ctx).await?;
        }

        Commands::Dtc { mask, clear } => {
            commands::dtc(&device, *mask, *clear, &ctx).await?;
        }

        Commands::Reset { soft, key_off_on } => {
            let kind = match (*soft, *key_off_on) {
                (true, _) => ResetKind::Soft,
                (false, true) => ResetKind::KeyOffOn,
                (false, false) => ResetKind::Hard,
            };
            commands::reset(&device, kind, &ctx).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_kind(args: &[&str]) -> Option<(bool, bool)> {
        let cli = Cli::try_parse_from(args).ok()?;
        match cli.command {
            Commands::Reset { soft, key_off_on } => Some((soft, key_off_on)),
            _ => None,
        }
    }

    #[test]
    fn test_reset_flags() {
        assert_eq!(reset_kind(&["busdiag", "reset"]), Some((false, false)));
        assert_eq!(reset_kind(&["busdiag", "reset", "--soft"]), Some((true, false)));
        assert_eq!(
            reset_kind(&["busdiag", "reset", "--key-off-on"]),
            Some((false, true))
        );
        assert_eq!(reset_kind(&["busdiag", "reset", "--soft", "--key-off-on"]), None);
    }
}
