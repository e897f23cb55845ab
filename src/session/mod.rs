use std::fmt;
use std::net::Ipv4Addr;

use crate::control::{is_bootstrap_action, URN_REMOTE_CONTROL};
use crate::crypto::SessionKeys;
use crate::error::VieraError;

pub mod sequence;
pub mod state;

use sequence::{SequenceCounter, SequenceReservation};
use state::HandshakeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Plain,
    Encrypted,
}

/// Pairing material obtained from the TV (`X_RequestAuth`), required by models
/// that only accept encrypted remote-control commands.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub application_id: String,
    pub encryption_key: String,
}

impl Credentials {
    pub fn new(application_id: impl Into<String>, encryption_key: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            encryption_key: encryption_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("application_id", &self.application_id)
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

/// State of one connection to a TV.
///
/// Owned by the command dispatcher; every mutation (handshake progress, sequence
/// numbers) goes through `&mut self` so a single writer is enforced by whoever
/// holds the session.
#[derive(Debug)]
pub struct Session {
    address: Ipv4Addr,
    mode: SessionMode,
    credentials: Option<Credentials>,
    keys: Option<SessionKeys>,
    session_id: Option<String>,
    sequence: SequenceCounter,
    state: HandshakeState,
}

/// Everything needed to wrap one encrypted command, borrowed from the session
/// while the sequence number is reserved.
#[derive(Debug)]
pub struct CommandSlot<'a> {
    pub session_id: &'a str,
    pub application_id: &'a str,
    pub keys: &'a SessionKeys,
    pub reservation: SequenceReservation<'a>,
}

impl Session {
    /// Validates the address and, when credentials are given, derives the
    /// session keys. The session id is only assigned by the handshake.
    pub fn new(address: &str, credentials: Option<Credentials>) -> Result<Self, VieraError> {
        let address = parse_address(address)?;
        let (mode, keys, state) = match &credentials {
            None => (SessionMode::Plain, None, HandshakeState::Unstarted),
            Some(creds) => {
                let keys = SessionKeys::derive(&creds.encryption_key)?;
                let state = HandshakeState::Unstarted.transition(HandshakeState::KeysDerived)?;
                (SessionMode::Encrypted, Some(keys), state)
            }
        };
        Ok(Self {
            address,
            mode,
            credentials,
            keys,
            session_id: None,
            sequence: SequenceCounter::new(),
            state,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn application_id(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.application_id.as_str())
    }

    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.sequence.current()
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn is_established(&self) -> bool {
        self.state.is_established()
    }

    /// Decides whether `action` must travel inside `X_EncryptedCommand`.
    ///
    /// Fails when wrapping is required but the handshake has not completed yet.
    pub fn wraps(&self, urn: &str, action: &str) -> Result<bool, VieraError> {
        if self.mode == SessionMode::Plain
            || urn != URN_REMOTE_CONTROL
            || is_bootstrap_action(action)
        {
            return Ok(false);
        }
        if !self.is_established() {
            return Err(VieraError::SessionNotEstablished);
        }
        Ok(true)
    }

    /// Reserves the next sequence number for an encrypted command.
    pub fn reserve_command(&mut self) -> Result<CommandSlot<'_>, VieraError> {
        if !self.is_established() {
            return Err(VieraError::SessionNotEstablished);
        }
        let session_id = self
            .session_id
            .as_deref()
            .ok_or(VieraError::SessionNotEstablished)?;
        let keys = self.keys.as_ref().ok_or(VieraError::SessionNotEstablished)?;
        let application_id = self
            .credentials
            .as_ref()
            .map(|c| c.application_id.as_str())
            .ok_or(VieraError::SessionNotEstablished)?;
        let reservation = self.sequence.reserve()?;
        Ok(CommandSlot {
            session_id,
            application_id,
            keys,
            reservation,
        })
    }

    /// Clears any previous session id so the handshake can run (again).
    pub(crate) fn begin_handshake(&mut self) -> Result<(), VieraError> {
        if self.state != HandshakeState::KeysDerived {
            self.state = self.state.transition(HandshakeState::KeysDerived)?;
        }
        self.session_id = None;
        self.sequence.reset();
        Ok(())
    }

    pub(crate) fn establish(&mut self, session_id: String) -> Result<(), VieraError> {
        self.state = self.state.transition(HandshakeState::SessionEstablished)?;
        self.sequence.reset();
        self.sequence.initialize(1)?;
        self.session_id = Some(session_id);
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: String) {
        self.session_id = None;
        self.sequence.reset();
        self.state = HandshakeState::Failed(reason);
    }
}

fn parse_address(address: &str) -> Result<Ipv4Addr, VieraError> {
    address
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| VieraError::InvalidAddress(address.to_string()))
}
