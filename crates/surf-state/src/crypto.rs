//! AES-256-GCM envelope for state files.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{StateError, StateResult};

/// Environment variable carrying the 64-hex-character (256-bit) key.
/// Generate with: `openssl rand -hex 32`.
pub const ENCRYPTION_KEY_ENV: &str = "SURF_ENCRYPTION_KEY";

/// GCM nonce length in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Envelope format version.
const PAYLOAD_VERSION: u32 = 1;

/// A 256-bit symmetric key.
pub type EncryptionKey = [u8; 32];

/// Versioned authenticated-encryption envelope written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub version: u32,
    pub encrypted: bool,
    /// Base64-encoded nonce, fresh per encryption.
    pub iv: String,
    /// Base64-encoded GCM authentication tag.
    #[serde(rename = "authTag")]
    pub auth_tag: String,
    /// Base64-encoded ciphertext.
    pub data: String,
}

/// Parses a 64-hex-character string into a key.
pub fn parse_key(hex_str: &str) -> Option<EncryptionKey> {
    if hex_str.len() != 64 {
        return None;
    }
    let bytes = hex::decode(hex_str).ok()?;
    bytes.try_into().ok()
}

/// Reads the encryption key from the environment.
///
/// Absent, empty, wrong-length, or non-hex values all mean "no key
/// configured" (persist in plaintext), never a fatal condition. A present
/// but malformed key logs a warning so the misconfiguration is visible.
pub fn encryption_key_from_env() -> Option<EncryptionKey> {
    let raw = std::env::var(ENCRYPTION_KEY_ENV).ok()?;
    if raw.is_empty() {
        return None;
    }
    let key = parse_key(&raw);
    if key.is_none() {
        warn!(
            "{ENCRYPTION_KEY_ENV} should be a 64-character hex string (256 bits); \
             ignoring it and persisting state in plaintext"
        );
    }
    key
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
///
/// Two encryptions of identical plaintext produce different IVs and
/// different ciphertext.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> StateResult<EncryptedPayload> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| StateError::EncryptFailed)?;

    // The aead crate appends the tag to the ciphertext; the envelope keeps
    // them as separate fields.
    let split_at = sealed.len().saturating_sub(TAG_LEN);
    let (ciphertext, tag) = sealed.split_at(split_at);

    Ok(EncryptedPayload {
        version: PAYLOAD_VERSION,
        encrypted: true,
        iv: BASE64.encode(iv),
        auth_tag: BASE64.encode(tag),
        data: BASE64.encode(ciphertext),
    })
}

/// Decrypts an envelope, failing closed on any tampering or key mismatch.
pub fn decrypt(payload: &EncryptedPayload, key: &EncryptionKey) -> StateResult<Vec<u8>> {
    // Undecodable fields count as tampering; no partial output either way.
    let iv = BASE64.decode(&payload.iv).map_err(|_| StateError::Tampered)?;
    let tag = BASE64
        .decode(&payload.auth_tag)
        .map_err(|_| StateError::Tampered)?;
    let ciphertext = BASE64
        .decode(&payload.data)
        .map_err(|_| StateError::Tampered)?;

    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(StateError::Tampered);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);

    cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
        .map_err(|_| StateError::Tampered)
}

/// Structural predicate deciding plaintext-vs-encrypted on read.
pub fn is_encrypted_payload(value: &Value) -> bool {
    value.get("encrypted").and_then(|v| v.as_bool()) == Some(true)
        && value.get("version").is_some()
        && value.get("iv").is_some()
        && value.get("authTag").is_some()
        && value.get("data").is_some()
}
