//! Caller-facing helpers on top of the command channel.
//!
//! Each method picks the endpoint, URN, action and parameter fragment for one
//! TV feature and parses a single field out of the reply.
pub mod client;
pub mod keys;

pub use client::VieraClient;
pub use keys::{RemoteKey, UnknownKey};
