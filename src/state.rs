use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicI32, Ordering};

use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Forward-only lifecycle:
/// `Idle -> Initialized -> Connected <-> Streaming`, with disconnect back to
/// `Initialized` and cleanup back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum SessionState {
    Idle = 0,
    Initialized = 1,
    Connected = 2,
    Streaming = 3,
}

impl SessionState {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    fn from_i32(value: i32) -> Self {
        match value {
            1 => SessionState::Initialized,
            2 => SessionState::Connected,
            3 => SessionState::Streaming,
            _ => SessionState::Idle,
        }
    }

    /// True when a muxer and encoders are open.
    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Streaming)
    }

    pub(crate) fn require(self, allowed: &[SessionState], op: &str) -> Result<()> {
        if allowed.contains(&self) {
            return Ok(());
        }
        let expected = allowed
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(BridgeError::not_connected(format!(
            "{}: invalid state: expected {}, got {}",
            op, expected, self
        )))
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Initialized => "initialized",
            SessionState::Connected => "connected",
            SessionState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Lock-free copy of the state for readers that must not wait on the session lock.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicI32);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicI32::new(SessionState::Idle.as_i32()))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_i32(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SessionState) {
        let previous = SessionState::from_i32(self.0.swap(state.as_i32(), Ordering::AcqRel));
        if previous != state {
            log::debug!("session state {} -> {}", previous, state);
        }
    }
}
