use thiserror::Error;

use crate::crypto::CryptoError;
use crate::handshake::transport::TransportError;
use crate::session::sequence::SequenceError;
use crate::session::state::SessionStateError;

/// Errors surfaced to callers of the command channel.
///
/// Lower layers keep their own error enums; everything is folded into this one
/// at the dispatcher and client boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VieraError {
    #[error("invalid encryption key: {0}")]
    InvalidKeyFormat(String),
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("encrypted session not established")]
    SessionNotEstablished,
    #[error("sequence counter already initialized")]
    AlreadyInitialized,
    #[error("transport failed: {0}")]
    TransportFailed(#[source] TransportError),
    /// The TV received the request and answered with a non-2xx status.
    #[error("device answered with http status {status}")]
    DeviceFault { status: u16, body: String },
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("decrypted payload is malformed")]
    MalformedPayload,
    #[error("response is missing <{0}>")]
    MissingField(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("session state: {0}")]
    State(#[from] SessionStateError),
    #[error("config error: {0}")]
    Config(String),
}

impl From<CryptoError> for VieraError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyFormat(detail) => VieraError::InvalidKeyFormat(detail),
            CryptoError::DecryptionFailed(detail) => VieraError::DecryptionFailed(detail),
            CryptoError::MalformedPayload => VieraError::MalformedPayload,
            CryptoError::PayloadTooLarge(len) => {
                VieraError::InvalidArgument(format!("payload of {len} bytes is too large"))
            }
        }
    }
}

impl From<SequenceError> for VieraError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::AlreadyInitialized => VieraError::AlreadyInitialized,
            SequenceError::SessionNotEstablished => VieraError::SessionNotEstablished,
        }
    }
}

impl From<TransportError> for VieraError {
    fn from(err: TransportError) -> Self {
        VieraError::TransportFailed(err)
    }
}
