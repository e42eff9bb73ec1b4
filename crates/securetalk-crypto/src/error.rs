use thiserror::Error;

/// Failures raised by the cipher engine and the key wrapper.
///
/// `AuthenticationFailed` covers both a tampered ciphertext and a wrong key;
/// GCM cannot tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid IV length: expected {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("malformed ciphertext: {len} bytes is shorter than the {tag}-byte tag")]
    MalformedCiphertext { len: usize, tag: usize },

    #[error("authentication failed: ciphertext tampered or wrong key")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("key integrity check failed: {0}")]
    KeyIntegrity(String),
}
