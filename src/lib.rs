//! Client for the network remote-control API of Panasonic Viera TVs.
//!
//! The TV exposes SOAP actions over HTTP. Newer models only accept remote-control
//! actions wrapped in `X_EncryptedCommand`, encrypted with AES-128-CBC and
//! authenticated with HMAC-SHA-256 under keys derived from the pairing key, and
//! each wrapped command carries a per-session sequence number.

pub mod config;
pub mod control;
pub mod crypto;
pub mod e2e_common;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod sdk;
pub mod session;

pub use config::ClientConfig;
pub use control::{CommandDispatcher, URN_REMOTE_CONTROL, URN_RENDERING_CONTROL};
pub use crypto::{decrypt_payload, encrypt_payload, MacPolicy, SessionKeys};
pub use error::VieraError;
pub use handshake::transport::{
    HttpSoapTransport, SoapRequest, SoapResponse, SoapTransport, TimeoutTransport, TransportError,
};
pub use handshake::SessionHandshake;
pub use sdk::{RemoteKey, VieraClient};
pub use session::state::HandshakeState;
pub use session::{Credentials, Session, SessionMode};
