//! Transport layer: byte streams, adapter connections, frame links
//!
//! - [`Connection`] owns one serial (or simulated) adapter, runs the
//!   background reader and reconnects after mid-stream failures
//! - [`FrameLink`] is what the diagnostic engine talks to
//! - [`MockFrameLink`] answers from a response table for tests
//!
//! # Example
//!
//! ```ignore
//! use busdiag_uds::{bus::FrameBus, config::BusDiagConfig, transport::Connection};
//!
//! let config = BusDiagConfig::default();
//! let connection = Connection::from_config(&config, FrameBus::default())?;
//! connection.connect()?;
//! ```

mod connection;
pub mod error;
mod event;
mod link;
pub mod mock;
mod reconnect;
pub mod serial;
mod stream;

pub use connection::{Connection, ConnectionOptions, ConnectionStats};
pub use error::TransportError;
pub use event::{ConnectionState, ErrorKind, TransportEvent};
pub use link::FrameLink;
pub use mock::MockFrameLink;
pub use reconnect::ReconnectPolicy;
pub use serial::{ports, PortInfo, SerialConnector};
pub use stream::{Connector, LineAssembler, StreamHandle};
