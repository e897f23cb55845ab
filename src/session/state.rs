use std::fmt;

use thiserror::Error;

/// Progress of the encrypted-session handshake.
///
/// Plain sessions stay in `Unstarted` for their whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Unstarted,
    KeysDerived,
    SessionEstablished,
    Failed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid handshake transition from {from} to {to}")]
pub struct SessionStateError {
    pub from: String,
    pub to: String,
}

impl HandshakeState {
    /// Validates `next` against the current state and returns it.
    ///
    /// Established and failed sessions may go back to `KeysDerived` so the
    /// handshake can be re-run, which replaces the previous session id.
    pub fn transition(&self, next: HandshakeState) -> Result<HandshakeState, SessionStateError> {
        use HandshakeState::*;
        let allowed = matches!(
            (self, &next),
            (Unstarted, KeysDerived)
                | (KeysDerived, SessionEstablished)
                | (KeysDerived, Failed(_))
                | (SessionEstablished, KeysDerived)
                | (Failed(_), KeysDerived)
        );
        if allowed {
            Ok(next)
        } else {
            Err(SessionStateError {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self, HandshakeState::SessionEstablished)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Unstarted => f.write_str("unstarted"),
            HandshakeState::KeysDerived => f.write_str("keys-derived"),
            HandshakeState::SessionEstablished => f.write_str("session-established"),
            HandshakeState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}
