//! Events published by a connection

use std::fmt;

use serde::Serialize;

/// Connection lifecycle
///
/// `Reconnecting` is only entered from `Connected`; `Failed` stays until
/// the next explicit connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Label carried by [`TransportEvent::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Open,
    Io,
    Decode,
    Timeout,
    NegativeResponse,
    SecurityDenied,
    LockedOut,
    /// Reconnect attempts exhausted
    ConnectionLost,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransportEvent {
    StateChanged {
        state: ConnectionState,
        message: Option<String>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    /// One received line, terminator stripped
    RawLine(String),
}
