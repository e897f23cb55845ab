//! Session key derivation and the encrypted payload format carried in
//! `X_EncInfo` (outbound) and `X_EncResult` (inbound).
//!
//! Before encryption a payload is laid out as 12 random bytes, the plaintext
//! length as a 4-byte big-endian integer, then the UTF-8 plaintext. The buffer is
//! encrypted with AES-128-CBC and followed by an HMAC-SHA-256 tag computed over
//! the ciphertext. The whole thing travels as standard base64.

use std::fmt;

use aes::Aes128;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

pub const KEY_LEN: usize = 16;
pub const HMAC_KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 16;

/// Devices and pairing tools are not strict about base64 padding or trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("{0}")]
    InvalidKeyFormat(String),
    #[error("{0}")]
    DecryptionFailed(String),
    #[error("no NUL terminator or valid padding in decrypted payload")]
    MalformedPayload,
    #[error("plaintext of {0} bytes does not fit the length prefix")]
    PayloadTooLarge(usize),
}

/// Whether the HMAC tag on an inbound payload is checked before decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacPolicy {
    Verify,
    /// Accept payloads whose tag does not match. Only for firmware that is known
    /// to emit bad tags.
    Ignore,
}

/// Key material derived from the device-issued encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    key: [u8; KEY_LEN],
    iv: [u8; KEY_LEN],
    hmac_key: [u8; HMAC_KEY_LEN],
}

impl SessionKeys {
    /// Derives the session key, IV and HMAC key from the base64 encryption key
    /// handed out by the TV during pairing.
    pub fn derive(encryption_key: &str) -> Result<Self, CryptoError> {
        let decoded = LENIENT_BASE64
            .decode(encryption_key.trim())
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("base64: {}", e)))?;
        let iv: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKeyFormat(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                decoded.len()
            ))
        })?;
        Ok(Self::from_iv(iv))
    }

    /// The key is the IV with the two halves of every 4-byte block swapped.
    pub fn from_iv(iv: [u8; KEY_LEN]) -> Self {
        let mut key = [0u8; KEY_LEN];
        for i in (0..KEY_LEN).step_by(4) {
            key[i] = iv[i + 2];
            key[i + 1] = iv[i + 3];
            key[i + 2] = iv[i];
            key[i + 3] = iv[i + 1];
        }

        let mut hmac_key = [0u8; HMAC_KEY_LEN];
        hmac_key[..KEY_LEN].copy_from_slice(&iv);
        hmac_key[KEY_LEN..].copy_from_slice(&iv);

        Self { key, iv, hmac_key }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; KEY_LEN] {
        &self.iv
    }

    pub fn hmac_key(&self) -> &[u8; HMAC_KEY_LEN] {
        &self.hmac_key
    }

    fn mac(&self) -> Result<HmacSha256, CryptoError> {
        <HmacSha256 as Mac>::new_from_slice(&self.hmac_key)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("hmac key: {}", e)))
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Encrypts `plaintext` into the base64 form placed inside `X_EncInfo`.
pub fn encrypt_payload(plaintext: &str, keys: &SessionKeys) -> Result<String, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    encrypt_with_nonce(plaintext, keys, nonce)
}

fn encrypt_with_nonce(
    plaintext: &str,
    keys: &SessionKeys,
    nonce: [u8; NONCE_LEN],
) -> Result<String, CryptoError> {
    let body = plaintext.as_bytes();
    let len = u32::try_from(body.len()).map_err(|_| CryptoError::PayloadTooLarge(body.len()))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&nonce);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(body);

    let mut sealed = Aes128CbcEnc::new((&keys.key[..]).into(), (&keys.iv[..]).into())
        .encrypt_padded_vec_mut::<Pkcs7>(&buf);

    let mut mac = keys.mac()?;
    mac.update(&sealed);
    sealed.extend_from_slice(&mac.finalize().into_bytes());

    Ok(STANDARD.encode(sealed))
}

/// Decrypts the base64 content of an `X_EncResult` element.
///
/// Payloads produced by [`encrypt_payload`] carry PKCS#7 padding. Device firmware
/// instead zero-pads and terminates the text with a NUL byte, so when the
/// padding does not check out the plaintext runs up to the first NUL after the
/// 16-byte header.
pub fn decrypt_payload(
    encoded: &str,
    keys: &SessionKeys,
    policy: MacPolicy,
) -> Result<String, CryptoError> {
    let raw = LENIENT_BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::DecryptionFailed(format!("base64: {}", e)))?;
    if raw.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed(format!(
            "payload of {} bytes is shorter than header and tag",
            raw.len()
        )));
    }
    let (ciphertext, tag) = raw.split_at(raw.len() - TAG_LEN);

    if policy == MacPolicy::Verify {
        let mut mac = keys.mac()?;
        mac.update(ciphertext);
        mac.verify_slice(tag)
            .map_err(|_| CryptoError::DecryptionFailed("HMAC tag mismatch".into()))?;
    }

    let decryptor = || Aes128CbcDec::new((&keys.key[..]).into(), (&keys.iv[..]).into());
    let body = match decryptor().decrypt_padded_vec_mut::<Pkcs7>(ciphertext) {
        Ok(unpadded) => {
            let body = unpadded.get(HEADER_LEN..).ok_or(CryptoError::MalformedPayload)?;
            until_nul(body).to_vec()
        }
        Err(_) => {
            let plain = decryptor()
                .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
                .map_err(|_| {
                    CryptoError::DecryptionFailed("ciphertext is not block aligned".into())
                })?;
            let body = plain.get(HEADER_LEN..).ok_or(CryptoError::MalformedPayload)?;
            let end = body
                .iter()
                .position(|b| *b == 0)
                .ok_or(CryptoError::MalformedPayload)?;
            body[..end].to_vec()
        }
    };

    String::from_utf8(body).map_err(|e| CryptoError::DecryptionFailed(format!("utf-8: {}", e)))
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|b| *b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}
