//! Diagnostic session engine
//!
//! Drives the UDS handshake over a [`FrameLink`](crate::transport::FrameLink):
//! session control, the security seed/key exchange and the tester present
//! keepalive. Session phase and security state are tracked independently.

mod engine;
mod keepalive;
mod pending;

use std::fmt;

use serde::Serialize;

pub use engine::DiagnosticEngine;
pub use pending::PendingRequest;

/// Diagnostic session progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Session control sent, awaiting the response
    SessionRequested,
    SessionActive,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::SessionRequested => "session requested",
            SessionPhase::SessionActive => "session active",
        };
        f.write_str(s)
    }
}

/// Security access progress
///
/// `LockedOut` survives session changes and resets; only a new engine
/// (after the ECU has been power cycled) starts from `Locked` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SecurityState {
    #[default]
    Locked,
    SeedRequested,
    SeedHeld,
    KeySent,
    Unlocked,
    /// Last key was rejected
    Denied,
    LockedOut,
}

impl SecurityState {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, SecurityState::Unlocked)
    }
}

impl fmt::Display for SecurityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityState::Locked => "locked",
            SecurityState::SeedRequested => "seed requested",
            SecurityState::SeedHeld => "seed held",
            SecurityState::KeySent => "key sent",
            SecurityState::Unlocked => "unlocked",
            SecurityState::Denied => "denied",
            SecurityState::LockedOut => "locked out",
        };
        f.write_str(s)
    }
}
