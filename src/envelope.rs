//! SOAP 1.1 envelope templating and the few response-scanning helpers the
//! command channel needs.
//!
//! Envelopes are built from fixed templates. Values interpolated as text
//! (application id, session id, device-supplied strings) are escaped. The
//! `parameters` fragment of an action is caller-supplied XML: it is checked to be
//! a balanced fragment by [`validate_action`] and then inserted as is.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;

use crate::error::VieraError;

const BODY_PREFIX: &str = "u";
const SEQUENCE_DIGITS: u64 = 100_000_000;

/// Escapes the five XML special characters in a text value.
pub fn escape_text(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// `<tag>escaped value</tag>`
pub fn text_element(tag: &str, value: &str) -> String {
    format!("<{tag}>{}</{tag}>", escape_text(value))
}

/// The namespaced action element, e.g. `<u:X_SendKey xmlns:u="urn:...">..</u:X_SendKey>`.
pub fn action_element(urn: &str, action: &str, parameters: &str) -> String {
    format!(
        "<{p}:{action} xmlns:{p}=\"urn:{urn}\">{parameters}</{p}:{action}>",
        p = BODY_PREFIX
    )
}

/// Wraps one action element in the SOAP envelope sent to the TV.
pub fn soap_envelope(urn: &str, action: &str, parameters: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
            "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" ",
            "s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">",
            "<s:Body>{}</s:Body>",
            "</s:Envelope>"
        ),
        action_element(urn, action, parameters)
    )
}

/// Sequence numbers travel as exactly eight digits; larger values keep their
/// last eight digits.
pub fn format_sequence(seq: u64) -> String {
    format!("{:08}", seq % SEQUENCE_DIGITS)
}

/// The plaintext that gets encrypted into `X_EncInfo` for a wrapped command.
pub fn original_command(
    session_id: &str,
    seq: u64,
    urn: &str,
    action: &str,
    parameters: &str,
) -> String {
    format!(
        "{}{}<X_OriginalCommand>{}</X_OriginalCommand>",
        text_element("X_SessionId", session_id),
        text_element("X_SequenceNumber", &format_sequence(seq)),
        action_element(urn, action, parameters)
    )
}

/// `X_ApplicationId` plus the encrypted blob, used both by the session request
/// and by every `X_EncryptedCommand`.
pub fn application_parameters(application_id: &str, enc_info: &str) -> String {
    format!(
        "{}{}",
        text_element("X_ApplicationId", application_id),
        text_element("X_EncInfo", enc_info)
    )
}

/// HTTP headers required on every control request.
pub fn soap_headers(urn: &str, action: &str) -> Vec<(String, String)> {
    vec![
        (
            "Content-Type".to_string(),
            "text/xml; charset=\"utf-8\"".to_string(),
        ),
        ("SOAPAction".to_string(), format!("\"urn:{urn}#{action}\"")),
        ("Cache-Control".to_string(), "no-cache".to_string()),
        ("Pragma".to_string(), "no-cache".to_string()),
        ("Accept".to_string(), "text/xml".to_string()),
    ]
}

type PatternCell = OnceLock<Result<Regex, regex::Error>>;

fn cached(cell: &'static PatternCell, pattern: &str) -> Result<&'static Regex, VieraError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| VieraError::InvalidArgument(format!("pattern {pattern}: {e}")))
}

fn xml_name_pattern() -> Result<&'static Regex, VieraError> {
    static PATTERN: PatternCell = OnceLock::new();
    cached(&PATTERN, r"^[A-Za-z_][A-Za-z0-9_.\-]*$")
}

/// Element names as they appear in responses, prefixes included.
fn element_name_pattern() -> Result<&'static Regex, VieraError> {
    static PATTERN: PatternCell = OnceLock::new();
    cached(&PATTERN, r"^[A-Za-z_][A-Za-z0-9_.:\-]*$")
}

fn urn_pattern() -> Result<&'static Regex, VieraError> {
    static PATTERN: PatternCell = OnceLock::new();
    cached(&PATTERN, r"^[A-Za-z0-9][A-Za-z0-9:._\-]*$")
}

/// Any markup between `<` and `>`; its content is checked against [`tag_pattern`].
fn markup_pattern() -> Result<&'static Regex, VieraError> {
    static PATTERN: PatternCell = OnceLock::new();
    cached(&PATTERN, r"<[^<>]*>")
}

fn tag_pattern() -> Result<&'static Regex, VieraError> {
    static PATTERN: PatternCell = OnceLock::new();
    cached(
        &PATTERN,
        concat!(
            r"^<(/)?([A-Za-z_][A-Za-z0-9_.:\-]*)",
            r#"((?:\s+[A-Za-z_][A-Za-z0-9_.:\-]*\s*=\s*(?:"(?:[^"<&]|&(?:[A-Za-z]+|#[0-9]+|#x[0-9A-Fa-f]+);)*"|'(?:[^'<&]|&(?:[A-Za-z]+|#[0-9]+|#x[0-9A-Fa-f]+);)*'))*)"#,
            r"\s*(/)?>$"
        ),
    )
}

fn text_pattern() -> Result<&'static Regex, VieraError> {
    static PATTERN: PatternCell = OnceLock::new();
    cached(
        &PATTERN,
        r"^(?:[^<&]|&(?:[A-Za-z]+|#[0-9]+|#x[0-9A-Fa-f]+);)*$",
    )
}

/// Checks that `action` is an XML name, `urn` a plain URN body and `parameters`
/// a balanced XML fragment (elements, attributes, text and entity references).
///
/// # Errors
/// `InvalidArgument` naming the first offending input.
pub fn validate_action(urn: &str, action: &str, parameters: &str) -> Result<(), VieraError> {
    if !xml_name_pattern()?.is_match(action) {
        return Err(VieraError::InvalidArgument(format!(
            "action {action:?} is not an XML name"
        )));
    }
    if !urn_pattern()?.is_match(urn) {
        return Err(VieraError::InvalidArgument(format!(
            "urn {urn:?} has characters outside a URN"
        )));
    }
    check_fragment(parameters)
        .map_err(|detail| VieraError::InvalidArgument(format!("parameters: {detail}")))
}

fn check_fragment(fragment: &str) -> Result<(), String> {
    let markup = markup_pattern().map_err(|e| e.to_string())?;
    let tag = tag_pattern().map_err(|e| e.to_string())?;
    let text = text_pattern().map_err(|e| e.to_string())?;

    let mut open: Vec<&str> = Vec::new();
    let mut cursor = 0;
    for m in markup.find_iter(fragment) {
        if !text.is_match(&fragment[cursor..m.start()]) {
            return Err(format!("bad text before byte {}", m.start()));
        }
        cursor = m.end();

        let caps = tag
            .captures(m.as_str())
            .ok_or_else(|| format!("malformed tag {}", m.as_str()))?;
        let name = caps.get(2).map_or("", |n| n.as_str());
        let closing = caps.get(1).is_some();
        let self_closing = caps.get(4).is_some();
        let has_attributes = caps.get(3).map_or(false, |a| !a.as_str().is_empty());

        if closing {
            if self_closing || has_attributes {
                return Err(format!("malformed closing tag {}", m.as_str()));
            }
            match open.pop() {
                Some(expected) if expected == name => {}
                Some(expected) => return Err(format!("</{name}> closes <{expected}>")),
                None => return Err(format!("</{name}> without an opening tag")),
            }
        } else if !self_closing {
            open.push(name);
        }
    }
    if !text.is_match(&fragment[cursor..]) {
        return Err("bad trailing text".into());
    }
    match open.pop() {
        Some(name) => Err(format!("<{name}> is never closed")),
        None => Ok(()),
    }
}

/// Returns the raw text between the first `<tag>` and its closing tag, or
/// `None` when the body has no such element.
///
/// # Errors
/// `InvalidArgument` when `tag` is not an XML name.
pub fn extract_tag<'a>(body: &'a str, tag: &str) -> Result<Option<&'a str>, VieraError> {
    let re = element_pattern(tag)?;
    Ok(re
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str()))
}

fn element_pattern(tag: &str) -> Result<Regex, VieraError> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(Default::default);
    if let Some(re) = cache.lock().get(tag) {
        return Ok(re.clone());
    }
    if !element_name_pattern()?.is_match(tag) {
        return Err(VieraError::InvalidArgument(format!(
            "tag {tag:?} is not an XML name"
        )));
    }
    let re = Regex::new(&format!(r"(?s)<{0}>(.*?)</{0}>", regex::escape(tag)))
        .map_err(|e| VieraError::InvalidArgument(format!("tag {tag:?}: {e}")))?;
    cache.lock().insert(tag.to_string(), re.clone());
    Ok(re)
}

fn enc_result_pattern() -> Option<&'static Regex> {
    static PATTERN: PatternCell = OnceLock::new();
    cached(&PATTERN, r"(?is)<X_EncResult>(.*?)</X_EncResult>").ok()
}

/// Encrypted result segment found in a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSegment<'a> {
    /// Byte range of the whole `<X_EncResult>..</X_EncResult>` element.
    pub range: std::ops::Range<usize>,
    /// The base64 content.
    pub payload: &'a str,
}

/// Locates the `X_EncResult` element, if the response carries one. The tag is
/// matched case-insensitively as some firmware lower-cases it.
pub fn find_encrypted_result(body: &str) -> Option<EncryptedSegment<'_>> {
    let caps = enc_result_pattern()?.captures(body)?;
    let whole = caps.get(0)?;
    let payload = caps.get(1)?;
    Some(EncryptedSegment {
        range: whole.range(),
        payload: payload.as_str(),
    })
}

/// Replaces the encrypted element with its decrypted text.
pub fn splice_segment(body: &str, segment: &EncryptedSegment<'_>, plaintext: &str) -> String {
    let mut out = String::with_capacity(body.len() + plaintext.len());
    out.push_str(&body[..segment.range.start]);
    out.push_str(plaintext);
    out.push_str(&body[segment.range.end..]);
    out
}
