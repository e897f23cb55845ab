//! Encrypted session establishment.
//!
//! Keys are derived when the [`Session`] is created; the handshake then asks the
//! TV for a session id with `X_GetEncryptSessionId`, proving possession of the
//! keys by sending the application id both in clear and encrypted. The call is a
//! bootstrap action and never goes through `X_EncryptedCommand` wrapping.

pub mod transport;

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::control::{exchange, ActionRequest, ACTION_GET_ENCRYPT_SESSION_ID, URN_REMOTE_CONTROL};
use crate::crypto::encrypt_payload;
use crate::envelope::{application_parameters, extract_tag, text_element};
use crate::error::VieraError;
use crate::session::{Session, SessionMode};
use transport::SoapTransport;

pub const SESSION_ID_TAG: &str = "X_SessionId";

/// Drives a session from `KeysDerived` to `SessionEstablished`.
pub struct SessionHandshake<'a, T: ?Sized> {
    transport: &'a T,
    config: &'a ClientConfig,
}

impl<'a, T> SessionHandshake<'a, T>
where
    T: SoapTransport + ?Sized,
{
    pub fn new(transport: &'a T, config: &'a ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Runs the session-id exchange. Re-running it on an established session
    /// replaces the session id and restarts the sequence at 1.
    ///
    /// Plain sessions have nothing to negotiate and return immediately.
    pub async fn run(&self, session: &mut Session) -> Result<(), VieraError> {
        if session.mode() == SessionMode::Plain {
            debug!(address = %session.address(), "plain session; skipping handshake");
            return Ok(());
        }
        session.begin_handshake()?;

        match self.request_session_id(session).await {
            Ok(session_id) => {
                session.establish(session_id)?;
                info!(address = %session.address(), "encrypted session established");
                Ok(())
            }
            Err(reason) => {
                warn!(address = %session.address(), %reason, "handshake failed");
                session.fail(reason.clone());
                Err(VieraError::HandshakeFailed(reason))
            }
        }
    }

    async fn request_session_id(&self, session: &mut Session) -> Result<String, String> {
        let (application_id, keys) = match (session.application_id(), session.keys()) {
            (Some(app), Some(keys)) => (app.to_string(), keys.clone()),
            _ => return Err("session has no credentials".into()),
        };

        let enc_info = encrypt_payload(&text_element("X_ApplicationId", &application_id), &keys)
            .map_err(|e| e.to_string())?;
        let parameters = application_parameters(&application_id, &enc_info);

        let request = ActionRequest {
            path: &self.config.remote_control_path,
            urn: URN_REMOTE_CONTROL,
            action: ACTION_GET_ENCRYPT_SESSION_ID,
            parameters: &parameters,
        };
        let body = exchange(session, self.transport, self.config, request)
            .await
            .map_err(|e| e.to_string())?;

        extract_tag(&body, SESSION_ID_TAG)
            .map_err(|e| e.to_string())?
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| format!("no <{}> in response", SESSION_ID_TAG))
    }
}
