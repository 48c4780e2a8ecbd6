//! busdiag-uds - serial bus adapters and UDS diagnostics
//!
//! Connects to a CAN/LIN adapter (or the built-in simulation), publishes
//! every decoded frame, and runs the UDS session handshake on top.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DiagnosticEngine                          │
//! │  session control, seed/key, keepalive, DID/DTC reads        │
//! │                          │                                  │
//! │              ┌───────────┴───────────┐                      │
//! │              │  FrameLink (trait)    │                      │
//! │              └───────────┬───────────┘                      │
//! │                          │                                  │
//! │  ┌──────────────┐  ┌─────┴──────┐  ┌─────────────────────┐  │
//! │  │  FrameBus    │◄─┤ Connection ├─►│ LineCodec (dialect) │  │
//! │  │  (fan-out)   │  │ read thread│  └─────────────────────┘  │
//! │  └──────────────┘  └─────┬──────┘                           │
//! │                          │                                  │
//! │              ┌───────────┴───────────┐                      │
//! │              │ SerialConnector /     │                      │
//! │              │ SimulatedConnector    │                      │
//! │              └───────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod session;
pub mod sim;
pub mod transport;
pub mod uds;

pub use bus::FrameBus;
pub use config::BusDiagConfig;
pub use error::ConfigError;
pub use session::{DiagnosticEngine, SecurityState, SessionPhase};
pub use transport::{
    Connection, ConnectionState, ErrorKind, FrameLink, TransportError, TransportEvent,
};
pub use uds::{DiagError, DiagResult, DtcRecord, EcuAddress, KeyAlgorithm, ResetKind};

// Re-export for convenience
pub use busdiag_conv::{DidReading, DidTable};
pub use busdiag_core::{BusFrame, CanId, Dialect, Direction, Frame, LineCodec};
