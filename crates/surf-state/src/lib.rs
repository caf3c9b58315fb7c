//! Encrypted-at-rest persistence of session state (cookies, storage).
//!
//! State files live under the sessions directory as
//! `<sessionName>-<sessionId>.json` and contain either plaintext JSON or an
//! authenticated AES-256-GCM envelope, decided by whether an encryption key
//! is configured. Reads detect the envelope structurally, so no out-of-band
//! flag is needed.

pub mod crypto;
pub mod error;
pub mod store;

pub use crypto::{
    decrypt, encrypt, encryption_key_from_env, is_encrypted_payload, parse_key,
    EncryptedPayload, EncryptionKey, ENCRYPTION_KEY_ENV, IV_LEN,
};
pub use error::{StateError, StateResult};
pub use store::{
    auto_state_file_path, auto_state_file_path_in, cleanup_expired_states,
    cleanup_expired_states_in, ensure_sessions_dir, list_state_files, read_state_file,
    sessions_dir, write_state_file,
};
