//! Cryptographic operations for the connection store.
//!
//! - **AES-256-GCM**: authenticated encryption of the whole document
//! - **PBKDF2-HMAC-SHA256**: optional passphrase-derived store key
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the encrypted connection file
//! - Tampering with or truncation of the connection file
//! - Offline brute-force of a passphrase-derived key (high iteration count)
//!
//! We do NOT defend against:
//! - A compromised machine or its memory
//! - Theft of a raw key file together with the connection file
//! - Loss of the passphrase (there is no escrow)

pub mod cipher;
pub mod key;
pub mod passphrase;

pub use cipher::{decrypt, encrypt, NONCE_LENGTH, TAG_LENGTH};
pub use key::{
    derive_key, KeyManager, KeyMaterial, PassphraseKeyFile, SecretKey, KEY_LENGTH,
    PBKDF2_ITERATIONS,
};
pub use passphrase::{normalize_passphrase, passphrase_from_env, PASSPHRASE_ENV_VAR};
