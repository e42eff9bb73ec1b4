//! AES-256-GCM cipher engine
//!
//! Ciphertext format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The IV travels separately (its own column), so it is not prepended here.
//! No AAD is bound. Empty input maps to empty output in both directions;
//! length validation of key and IV still applies first.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::CryptoError;
use crate::{IV_SIZE, KEY_SIZE, TAG_SIZE};

/// Encrypt `plaintext` under `key` with the caller-supplied `iv`.
///
/// Returns `ciphertext || tag`, or an empty vector for empty input.
pub fn encrypt(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(key)?;
    check_iv(iv)?;

    if plaintext.is_empty() {
        return Ok(Vec::new());
    }

    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt `ciphertext || tag` under `key` and `iv`.
///
/// Fails with `MalformedCiphertext` when the input cannot even hold a tag and
/// with `AuthenticationFailed` when the tag does not verify.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = build_cipher(key)?;
    check_iv(iv)?;

    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::MalformedCiphertext {
            len: ciphertext.len(),
            tag: TAG_SIZE,
        });
    }

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Encrypt a UTF-8 message, taking a base64 IV and returning base64 ciphertext.
pub fn encrypt_b64(plaintext: &str, key: &[u8], iv_b64: &str) -> Result<String, CryptoError> {
    let iv = decode_b64("IV", iv_b64)?;
    let ciphertext = encrypt(plaintext.as_bytes(), key, &iv)?;
    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt a base64 ciphertext with a base64 IV back into a UTF-8 message.
pub fn decrypt_b64(ciphertext_b64: &str, key: &[u8], iv_b64: &str) -> Result<String, CryptoError> {
    let iv = decode_b64("IV", iv_b64)?;
    let ciphertext = decode_b64("ciphertext", ciphertext_b64)?;
    let plaintext = decrypt(&ciphertext, key, &iv)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::InvalidEncoding(format!("plaintext is not UTF-8: {e}")))
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}

fn check_iv(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() != IV_SIZE {
        return Err(CryptoError::InvalidIvLength {
            expected: IV_SIZE,
            actual: iv.len(),
        });
    }
    Ok(())
}

fn decode_b64(what: &str, encoded: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidEncoding(format!("{what} is not base64: {e}")))
}
