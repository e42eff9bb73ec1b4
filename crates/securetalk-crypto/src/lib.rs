//! securetalk-crypto: per-account message encryption
//!
//! Every message is encrypted once per participant:
//! ```text
//! plaintext ─┬─ AES-256-GCM(key=sender_key,    iv=random_96bit) → ciphertext_for_sender
//!            └─ AES-256-GCM(key=recipient_key, iv=random_96bit) → ciphertext_for_recipient
//! ```
//!
//! Persisted form: base64(ciphertext || 128-bit tag), base64(iv).
//!
//! Account keys at rest are wrapped as base64(HMAC-SHA256(master, salt || key) || key).

pub mod cipher;
pub mod error;
pub mod keys;
pub mod wrap;

pub use cipher::{decrypt, decrypt_b64, encrypt, encrypt_b64};
pub use error::CryptoError;
pub use keys::{generate_iv, generate_iv_b64, generate_key, KeyMaterial};
pub use wrap::KeyWrapper;

/// Size of an account key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Size of a GCM IV in bytes (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag in bytes (128-bit)
pub const TAG_SIZE: usize = 16;

/// Size of the HMAC-SHA256 prefix on a wrapped key
pub const HMAC_SIZE: usize = 32;
