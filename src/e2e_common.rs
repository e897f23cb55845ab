//! In-memory TV used by the integration tests and examples.
//!
//! [`MockTv`] implements [`SoapTransport`] and answers like a real set: it hands
//! out a session id for `X_GetEncryptSessionId`, decrypts every
//! `X_EncryptedCommand`, checks its session id and sequence number, and replies
//! with an encrypted `X_EncResult`.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::control::{
    ACTION_ENCRYPTED_COMMAND, ACTION_GET_ENCRYPT_SESSION_ID, URN_REMOTE_CONTROL,
};
use crate::crypto::{decrypt_payload, encrypt_payload, MacPolicy, SessionKeys};
use crate::envelope::{action_element, extract_tag, text_element};
use crate::handshake::transport::{SoapRequest, SoapResponse, SoapTransport, TransportError};

pub const TEST_APP_ID: &str = "abc123";
pub const TEST_ENCRYPTION_KEY: &str = "dGhpc2lzMTZieXRlc2l2IA==";
pub const TEST_SESSION_ID: &str = "SESS1";

/// What the mock does with the next request.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail the request without processing it.
    Fail(TransportError),
    /// Never answer.
    Stall,
    /// Answer with this body verbatim.
    Reply(String),
    /// Answer with this HTTP status and body.
    Status(u16, String),
}

/// A command the TV accepted, after unwrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    pub action: String,
    pub parameters: String,
    /// Sequence number of an encrypted command, `None` for plain ones.
    pub sequence: Option<u64>,
}

#[derive(Debug, Default)]
struct TvState {
    faults: VecDeque<Fault>,
    requests: Vec<SoapRequest>,
    received: Vec<ReceivedCommand>,
    last_sequence: Option<u64>,
    volume: u8,
    muted: bool,
}

#[derive(Debug)]
pub struct MockTv {
    keys: Option<SessionKeys>,
    application_id: String,
    session_id: String,
    encrypt_results: bool,
    state: Mutex<TvState>,
}

impl MockTv {
    /// A set that accepts plain commands only.
    pub fn plain() -> Self {
        Self {
            keys: None,
            application_id: String::new(),
            session_id: TEST_SESSION_ID.to_string(),
            encrypt_results: false,
            state: Mutex::new(TvState::default()),
        }
    }

    /// A set paired with [`TEST_APP_ID`] / [`TEST_ENCRYPTION_KEY`].
    pub fn encrypted() -> Self {
        Self::paired(TEST_APP_ID, TEST_ENCRYPTION_KEY)
    }

    pub fn paired(application_id: &str, encryption_key: &str) -> Self {
        Self {
            keys: SessionKeys::derive(encryption_key).ok(),
            application_id: application_id.to_string(),
            session_id: TEST_SESSION_ID.to_string(),
            encrypt_results: true,
            state: Mutex::new(TvState::default()),
        }
    }

    /// Answer encrypted commands in clear instead of with `X_EncResult`.
    pub fn with_plain_results(mut self) -> Self {
        self.encrypt_results = false;
        self
    }

    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    pub fn set_volume(&self, volume: u8) {
        self.state.lock().volume = volume;
    }

    pub fn muted(&self) -> bool {
        self.state.lock().muted
    }

    pub fn requests(&self) -> Vec<SoapRequest> {
        self.state.lock().requests.clone()
    }

    pub fn received(&self) -> Vec<ReceivedCommand> {
        self.state.lock().received.clone()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.state.lock().last_sequence
    }

    fn handle(&self, request: &SoapRequest) -> Result<String, String> {
        let action = request
            .header("SOAPAction")
            .and_then(|v| v.trim_matches('"').rsplit_once('#'))
            .map(|(_, action)| action.to_string())
            .ok_or_else(|| bad_request("missing SOAPAction"))?;
        let urn = request
            .header("SOAPAction")
            .and_then(|v| v.trim_matches('"').strip_prefix("urn:"))
            .and_then(|v| v.split_once('#'))
            .map(|(urn, _)| urn.to_string())
            .unwrap_or_default();
        let inner = tag(&request.body, "s:Body")
            .and_then(|body| extract_action_parameters(body, &action))
            .ok_or_else(|| bad_request("missing action element"))?;

        match action.as_str() {
            ACTION_GET_ENCRYPT_SESSION_ID => self.open_session(&inner),
            ACTION_ENCRYPTED_COMMAND => self.encrypted_command(&inner),
            _ => {
                let reply = self.apply(&urn, &action, &inner, None)?;
                Ok(response(&urn, &action, &reply))
            }
        }
    }

    fn open_session(&self, parameters: &str) -> Result<String, String> {
        let keys = self.keys.as_ref().ok_or_else(|| bad_request("not paired"))?;
        let enc_info = tag(parameters, "X_EncInfo").ok_or_else(|| bad_request("no X_EncInfo"))?;
        let inner = decrypt_payload(enc_info, keys, MacPolicy::Verify)
            .map_err(|e| bad_request(&e.to_string()))?;
        if tag(&inner, "X_ApplicationId") != Some(self.application_id.as_str()) {
            return Err(bad_request("unknown application id"));
        }
        self.state.lock().last_sequence = Some(1);

        let payload = format!(
            "{}{}",
            text_element("X_ApplicationId", &self.application_id),
            text_element("X_SessionId", &self.session_id)
        );
        let sealed = encrypt_payload(&payload, keys).map_err(|e| bad_request(&e.to_string()))?;
        Ok(response(
            URN_REMOTE_CONTROL,
            ACTION_GET_ENCRYPT_SESSION_ID,
            &text_element("X_EncResult", &sealed),
        ))
    }

    fn encrypted_command(&self, parameters: &str) -> Result<String, String> {
        let keys = self.keys.as_ref().ok_or_else(|| bad_request("not paired"))?;
        let enc_info = tag(parameters, "X_EncInfo").ok_or_else(|| bad_request("no X_EncInfo"))?;
        let original = decrypt_payload(enc_info, keys, MacPolicy::Verify)
            .map_err(|e| bad_request(&e.to_string()))?;

        if tag(&original, "X_SessionId") != Some(self.session_id.as_str()) {
            return Err(bad_request("unknown session id"));
        }
        let seq = tag(&original, "X_SequenceNumber")
            .filter(|s| s.len() == 8)
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| bad_request("bad sequence number"))?;
        let expected = self.state.lock().last_sequence.map(|s| s + 1);
        if Some(seq) != expected {
            return Err(bad_request("sequence number out of step"));
        }

        let command = tag(&original, "X_OriginalCommand")
            .ok_or_else(|| bad_request("no X_OriginalCommand"))?;
        let (urn, action, inner) =
            split_action_element(command).ok_or_else(|| bad_request("bad original command"))?;
        // The number is used up even if the command itself is refused.
        self.state.lock().last_sequence = Some(seq);
        let reply = self.apply(&urn, &action, &inner, Some(seq))?;

        let result = action_element(&urn, &format!("{}Response", action), &reply);
        let body = if self.encrypt_results {
            let sealed = encrypt_payload(&result, keys).map_err(|e| bad_request(&e.to_string()))?;
            text_element("X_EncResult", &sealed)
        } else {
            result
        };
        Ok(response(URN_REMOTE_CONTROL, ACTION_ENCRYPTED_COMMAND, &body))
    }

    fn apply(
        &self,
        urn: &str,
        action: &str,
        parameters: &str,
        sequence: Option<u64>,
    ) -> Result<String, String> {
        if urn == URN_REMOTE_CONTROL && self.keys.is_some() && sequence.is_none() {
            if action != "X_DisplayPinCode" && action != "X_RequestAuth" {
                return Err(bad_request("encrypted commands required"));
            }
        }

        if action == "X_SendKey"
            && !tag(parameters, "X_KeyEvent").map_or(false, |code| code.starts_with("NRC_"))
        {
            return Err(bad_request("unknown key code"));
        }

        let mut state = self.state.lock();
        state.received.push(ReceivedCommand {
            action: action.to_string(),
            parameters: parameters.to_string(),
            sequence,
        });
        let reply = match action {
            "GetVolume" => text_element("CurrentVolume", &state.volume.to_string()),
            "SetVolume" => {
                state.volume = tag(parameters, "DesiredVolume")
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| bad_request("bad DesiredVolume"))?;
                String::new()
            }
            "GetMute" => text_element("CurrentMute", if state.muted { "1" } else { "0" }),
            "SetMute" => {
                state.muted = tag(parameters, "DesiredMute") == Some("1");
                String::new()
            }
            "X_DisplayPinCode" => text_element("X_ChallengeKey", "Y2hhbGxlbmdla2V5MTIzNA=="),
            _ => String::new(),
        };
        Ok(reply)
    }
}

#[async_trait]
impl SoapTransport for MockTv {
    async fn post(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        self.state.lock().requests.push(request.clone());
        let fault = self.state.lock().faults.pop_front();
        match fault {
            Some(Fault::Fail(err)) => Err(err),
            Some(Fault::Stall) => std::future::pending().await,
            Some(Fault::Reply(body)) => Ok(SoapResponse::ok(body)),
            Some(Fault::Status(status, body)) => Ok(SoapResponse { status, body }),
            None => Ok(match self.handle(&request) {
                Ok(body) => SoapResponse::ok(body),
                Err(fault) => SoapResponse {
                    status: 500,
                    body: fault,
                },
            }),
        }
    }
}

/// A SOAP fault body, answered with HTTP 500.
fn bad_request(detail: &str) -> String {
    format!("<s:Fault><faultstring>{}</faultstring></s:Fault>", detail)
}

fn tag<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    extract_tag(body, name).ok().flatten()
}

fn response(urn: &str, action: &str, inner: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\">",
            "<s:Body>{}</s:Body></s:Envelope>"
        ),
        action_element(urn, &format!("{}Response", action), inner)
    )
}

/// Returns the content of `<u:action ...>..</u:action>` in `body`.
fn extract_action_parameters(body: &str, action: &str) -> Option<String> {
    split_action_element(body)
        .filter(|(_, found, _)| found == action)
        .map(|(_, _, inner)| inner)
}

/// Splits `<u:Action xmlns:u="urn:URN">inner</u:Action>` into its parts.
fn split_action_element(element: &str) -> Option<(String, String, String)> {
    let open_end = element.find('>')?;
    let open = &element[..open_end];
    let action = open.strip_prefix("<u:")?.split_whitespace().next()?.to_string();
    let urn = open.split("xmlns:u=\"urn:").nth(1)?.split('"').next()?.to_string();
    let close = format!("</u:{}>", action);
    let inner_end = element.rfind(&close)?;
    let inner = element.get(open_end + 1..inner_end)?.to_string();
    Some((urn, action, inner))
}
