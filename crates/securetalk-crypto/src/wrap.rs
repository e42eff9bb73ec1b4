//! Key wrapping: tamper-evident storage form for account keys
//!
//! Wrapped format (base64 of):
//! ```text
//! [32 bytes: HMAC-SHA256(master_secret, salt || context || key)][32 bytes: key]
//! ```
//!
//! The key itself is not hidden; the HMAC prefix detects silent corruption or
//! substitution of stored key material. `context` binds a wrapped key to its
//! owner (stores pass the account id), so a wrapped key copied into another
//! owner's row fails verification. `wrap`/`unwrap` use an empty context.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::keys::KeyMaterial;
use crate::{HMAC_SIZE, KEY_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Development-only master secret. Never use outside local testing.
pub const DEV_MASTER_SECRET: &str = "securetalk-dev-master-secret-DO-NOT-USE";

/// Development-only salt.
pub const DEV_SALT: &str = "securetalksalt123456";

/// HMAC-SHA256 key wrapper keyed by a master secret.
#[derive(Clone)]
pub struct KeyWrapper {
    master_secret: SecretString,
    salt: String,
    development_default: bool,
}

impl KeyWrapper {
    pub fn new(master_secret: SecretString, salt: impl Into<String>) -> Self {
        Self {
            master_secret,
            salt: salt.into(),
            development_default: false,
        }
    }

    /// Build a wrapper from optional configuration values, substituting the
    /// development defaults for anything missing. Every substitution is
    /// logged at WARN.
    pub fn from_config(master_secret: Option<SecretString>, salt: Option<String>) -> Self {
        let mut development_default = false;

        let master_secret = match master_secret {
            Some(secret) if !secret.expose_secret().is_empty() => secret,
            _ => {
                tracing::warn!(
                    "no key-wrapping master secret configured: using the built-in DEVELOPMENT \
                     default. Stored account keys are NOT protected. Set SECURETALK_MASTER_SECRET \
                     or keys.master_secret before running in production."
                );
                development_default = true;
                SecretString::from(DEV_MASTER_SECRET)
            }
        };

        let salt = match salt {
            Some(salt) if !salt.is_empty() => salt,
            _ => {
                tracing::warn!(
                    "no key-wrapping salt configured: using the built-in DEVELOPMENT default"
                );
                development_default = true;
                DEV_SALT.to_string()
            }
        };

        Self {
            master_secret,
            salt,
            development_default,
        }
    }

    /// True when either the secret or the salt came from the development defaults.
    pub fn is_development_default(&self) -> bool {
        self.development_default
    }

    /// Wrap raw key material for storage.
    pub fn wrap(&self, key: &KeyMaterial) -> Result<String, CryptoError> {
        self.wrap_for(&[], key)
    }

    /// Verify and strip the HMAC prefix, returning the raw key.
    pub fn unwrap(&self, wrapped: &str) -> Result<KeyMaterial, CryptoError> {
        self.unwrap_for(&[], wrapped)
    }

    /// Wrap `key` bound to `context`. Only `unwrap_for` with the same
    /// context accepts the result.
    pub fn wrap_for(&self, context: &[u8], key: &KeyMaterial) -> Result<String, CryptoError> {
        let tag = self.mac(context, key.as_bytes())?.finalize().into_bytes();

        let mut combined = Vec::with_capacity(HMAC_SIZE + KEY_SIZE);
        combined.extend_from_slice(&tag);
        combined.extend_from_slice(key.as_bytes());
        let encoded = STANDARD.encode(&combined);
        combined.zeroize();
        Ok(encoded)
    }

    pub fn unwrap_for(&self, context: &[u8], wrapped: &str) -> Result<KeyMaterial, CryptoError> {
        let mut decoded = STANDARD
            .decode(wrapped)
            .map_err(|e| CryptoError::InvalidEncoding(format!("wrapped key is not base64: {e}")))?;

        if decoded.len() != HMAC_SIZE + KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::KeyIntegrity(format!(
                "wrapped key is {len} bytes (expected {})",
                HMAC_SIZE + KEY_SIZE
            )));
        }

        let (tag, key_bytes) = decoded.split_at(HMAC_SIZE);
        let verified = self
            .mac(context, key_bytes)
            .and_then(|mac| {
                mac.verify_slice(tag)
                    .map_err(|_| CryptoError::KeyIntegrity("HMAC mismatch".into()))
            })
            .and_then(|()| KeyMaterial::from_slice(key_bytes));

        decoded.zeroize();
        verified
    }

    fn mac(&self, context: &[u8], key: &[u8]) -> Result<HmacSha256, CryptoError> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(self.master_secret.expose_secret().as_bytes())
                .map_err(|e| CryptoError::KeyIntegrity(format!("HMAC init failed: {e}")))?;
        mac.update(self.salt.as_bytes());
        mac.update(context);
        mac.update(key);
        Ok(mac)
    }
}

impl std::fmt::Debug for KeyWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyWrapper")
            .field("master_secret", &"[REDACTED]")
            .field("development_default", &self.development_default)
            .finish()
    }
}
