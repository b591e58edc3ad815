//! AES-256-GCM encryption/decryption of the connection document.
//!
//! Output layout is `nonce (12 bytes) || ciphertext || tag (16 bytes)`. A
//! fresh random nonce is drawn for every call.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use zeroize::Zeroizing;

use crate::crypto::key::KEY_LENGTH;
use crate::error::{Result, StoreError};

/// Length of the random nonce prefixed to every ciphertext.
pub const NONCE_LENGTH: usize = 12;

/// Length of the GCM authentication tag appended by the cipher.
pub const TAG_LENGTH: usize = 16;

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_LENGTH {
        return Err(StoreError::InvalidKey {
            got: key.len(),
            want: KEY_LENGTH,
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| StoreError::InvalidKey {
        got: key.len(),
        want: KEY_LENGTH,
    })
}

/// Encrypt `plaintext` with AES-256-GCM under a 32-byte key.
///
/// # Errors
///
/// Returns `StoreError::InvalidKey` if `key` is not exactly 32 bytes, and
/// `StoreError::Crypto` if the system RNG or the cipher fails.
///
/// # Examples
///
/// ```
/// use sshmanager_core::crypto::{decrypt, encrypt};
///
/// let key = [7u8; 32];
/// let sealed = encrypt(b"secret data", &key).unwrap();
/// assert_eq!(decrypt(&sealed, &key).unwrap().as_slice(), b"secret data");
/// ```
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for(key)?;

    let mut nonce = [0u8; NONCE_LENGTH];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| StoreError::Crypto(format!("Failed to generate nonce: {}", e)))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| StoreError::Crypto(format!("AES-GCM encrypt failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext || tag` blob produced by [`encrypt`].
///
/// The plaintext is returned in a `Zeroizing` buffer so it is scrubbed on drop.
///
/// # Errors
///
/// - `StoreError::InvalidKey` if `key` is not exactly 32 bytes
/// - `StoreError::Authentication` if the blob is truncated, was tampered
///   with, or was sealed under a different key
pub fn decrypt(blob: &[u8], key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = cipher_for(key)?;

    if blob.len() < NONCE_LENGTH {
        return Err(StoreError::Authentication);
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_LENGTH);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| StoreError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: [u8; 32] = [0x5a; 32];

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let plaintext = b"version: '1.0'\nconnections: []\n";

        let sealed = encrypt(plaintext, &KEY).unwrap();
        let opened = decrypt(&sealed, &KEY).unwrap();

        assert_eq!(opened.as_slice(), plaintext);
        assert_eq!(sealed.len(), NONCE_LENGTH + plaintext.len() + TAG_LENGTH);
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let first = encrypt(b"same plaintext", &KEY).unwrap();
        let second = encrypt(b"same plaintext", &KEY).unwrap();

        assert_ne!(first[..NONCE_LENGTH], second[..NONCE_LENGTH]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sealed = encrypt(b"secret", &KEY).unwrap();
        let result = decrypt(&sealed, &[0x11; 32]);
        assert!(matches!(result, Err(StoreError::Authentication)));
    }

    #[test]
    fn test_truncated_input_fails_authentication() {
        assert!(matches!(
            decrypt(&[0u8; 5], &KEY),
            Err(StoreError::Authentication)
        ));
        // Nonce only, no tag.
        assert!(matches!(
            decrypt(&[0u8; NONCE_LENGTH], &KEY),
            Err(StoreError::Authentication)
        ));
    }

    #[test]
    fn test_invalid_key_rejected_before_cipher_use() {
        let result = encrypt(b"secret", &[1u8; 16]);
        assert!(matches!(
            result,
            Err(StoreError::InvalidKey { got: 16, want: 32 })
        ));

        let result = decrypt(&[0u8; 64], &[1u8; 33]);
        assert!(matches!(result, Err(StoreError::InvalidKey { got: 33, .. })));
    }

    #[test]
    fn test_empty_plaintext() {
        let sealed = encrypt(b"", &KEY).unwrap();
        assert!(decrypt(&sealed, &KEY).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..512),
                           key in proptest::array::uniform32(any::<u8>())) {
            let sealed = encrypt(&plaintext, &key).unwrap();
            let opened = decrypt(&sealed, &key).unwrap();
            prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
        }

        #[test]
        fn prop_single_bit_flip_is_rejected(plaintext in proptest::collection::vec(any::<u8>(), 0..128),
                                            position in any::<prop::sample::Index>(),
                                            bit in 0u8..8) {
            let mut sealed = encrypt(&plaintext, &KEY).unwrap();
            let idx = position.index(sealed.len());
            sealed[idx] ^= 1 << bit;
            prop_assert!(matches!(decrypt(&sealed, &KEY), Err(StoreError::Authentication)));
        }
    }
}
