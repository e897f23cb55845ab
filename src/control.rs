use std::borrow::Cow;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::crypto::{decrypt_payload, encrypt_payload, MacPolicy};
use crate::envelope::{
    application_parameters, find_encrypted_result, original_command, soap_envelope, soap_headers,
    splice_segment, validate_action,
};
use crate::error::VieraError;
use crate::handshake::transport::{SoapRequest, SoapTransport};
use crate::handshake::SessionHandshake;
use crate::session::state::HandshakeState;
use crate::session::{Session, SessionMode};

pub const URN_RENDERING_CONTROL: &str = "schemas-upnp-org:service:RenderingControl:1";
pub const URN_REMOTE_CONTROL: &str = "panasonic-com:service:p00NetworkControl:1";

pub const ACTION_GET_ENCRYPT_SESSION_ID: &str = "X_GetEncryptSessionId";
pub const ACTION_DISPLAY_PIN_CODE: &str = "X_DisplayPinCode";
pub const ACTION_REQUEST_AUTH: &str = "X_RequestAuth";
pub const ACTION_ENCRYPTED_COMMAND: &str = "X_EncryptedCommand";

/// Remote-control actions that are sent in clear even on encrypted sessions,
/// since they are what bootstraps pairing and the session.
pub const BOOTSTRAP_ACTIONS: [&str; 3] = [
    ACTION_GET_ENCRYPT_SESSION_ID,
    ACTION_DISPLAY_PIN_CODE,
    ACTION_REQUEST_AUTH,
];

pub fn is_bootstrap_action(action: &str) -> bool {
    BOOTSTRAP_ACTIONS.contains(&action)
}

/// A SOAP action addressed to one of the TV's control endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionRequest<'a> {
    pub path: &'a str,
    pub urn: &'a str,
    pub action: &'a str,
    /// XML fragment placed inside the action element.
    pub parameters: &'a str,
}

/// Sends one action on `session`, wrapping and unwrapping encryption as needed.
///
/// The caller must hold the session exclusively for the whole call; the
/// sequence number reserved for a wrapped command is only kept if the transport
/// returns a response, whatever its status. Malformed actions are rejected
/// before anything is reserved.
pub(crate) async fn exchange<T>(
    session: &mut Session,
    transport: &T,
    config: &ClientConfig,
    request: ActionRequest<'_>,
) -> Result<String, VieraError>
where
    T: SoapTransport + ?Sized,
{
    validate_action(request.urn, request.action, request.parameters)?;
    let wrap = session.wraps(request.urn, request.action)?;
    let host = session.address().to_string();
    let result_keys = session.keys().cloned();

    let (action, parameters, reservation) = if wrap {
        let slot = session.reserve_command()?;
        let seq = slot.reservation.value();
        let original = original_command(
            slot.session_id,
            seq,
            request.urn,
            request.action,
            request.parameters,
        );
        let enc_info = encrypt_payload(&original, slot.keys)?;
        let parameters = application_parameters(slot.application_id, &enc_info);
        debug!(action = request.action, seq, "wrapping in {}", ACTION_ENCRYPTED_COMMAND);
        (
            ACTION_ENCRYPTED_COMMAND,
            Cow::Owned(parameters),
            Some(slot.reservation),
        )
    } else {
        (request.action, Cow::Borrowed(request.parameters), None)
    };

    let soap_request = SoapRequest {
        host,
        port: config.port,
        path: request.path.to_string(),
        method: "POST".to_string(),
        headers: soap_headers(request.urn, action),
        body: soap_envelope(request.urn, action, &parameters),
    };
    debug!(action, path = request.path, "dispatching soap action");

    // Any answer, faults included, means the TV has seen this sequence number.
    let response = match transport.post(soap_request).await {
        Ok(response) => {
            if let Some(reservation) = reservation {
                reservation.commit();
            }
            response
        }
        Err(err) => {
            drop(reservation);
            return Err(VieraError::TransportFailed(err));
        }
    };
    if !response.is_success() {
        warn!(action, status = response.status, "tv rejected soap action");
        return Err(VieraError::DeviceFault {
            status: response.status,
            body: response.body,
        });
    }
    let body = response.body;

    let Some(segment) = find_encrypted_result(&body) else {
        return Ok(body);
    };
    let keys = result_keys.ok_or_else(|| {
        VieraError::DecryptionFailed("encrypted result on a session without keys".into())
    })?;
    let policy = config.mac_policy();
    if policy == MacPolicy::Ignore {
        warn!(action, "accepting encrypted result without checking its HMAC tag");
    }
    let plaintext = decrypt_payload(segment.payload, &keys, policy)?;
    Ok(splice_segment(&body, &segment, &plaintext))
}

/// Serializes all traffic for one TV session.
///
/// The session sits behind an async mutex that is held from the wrapping
/// decision until the response is back, so concurrent callers can never
/// interleave sequence-number increments and rollbacks.
#[derive(Debug)]
pub struct CommandDispatcher<T> {
    session: Mutex<Session>,
    transport: T,
    config: ClientConfig,
}

impl<T> CommandDispatcher<T>
where
    T: SoapTransport,
{
    pub fn new(session: Session, transport: T, config: ClientConfig) -> Self {
        Self {
            session: Mutex::new(session),
            transport,
            config,
        }
    }

    /// Establishes (or re-establishes) the encrypted session.
    pub async fn handshake(&self) -> Result<(), VieraError> {
        let mut session = self.session.lock().await;
        SessionHandshake::new(&self.transport, &self.config)
            .run(&mut session)
            .await
    }

    /// Sends `action` with `parameters` to `url_path` and returns the response
    /// body, with any encrypted result segment replaced by its plaintext.
    pub async fn send(
        &self,
        url_path: &str,
        urn: &str,
        action: &str,
        parameters: &str,
    ) -> Result<String, VieraError> {
        let mut session = self.session.lock().await;
        exchange(
            &mut session,
            &self.transport,
            &self.config,
            ActionRequest {
                path: url_path,
                urn,
                action,
                parameters,
            },
        )
        .await
    }

    pub async fn mode(&self) -> SessionMode {
        self.session.lock().await.mode()
    }

    pub async fn state(&self) -> HandshakeState {
        self.session.lock().await.state().clone()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.session_id().map(str::to_string)
    }

    pub async fn sequence_number(&self) -> Option<u64> {
        self.session.lock().await.sequence_number()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_session(self) -> Session {
        self.session.into_inner()
    }
}
