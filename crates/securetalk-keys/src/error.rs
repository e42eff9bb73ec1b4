use securetalk_core::{AccountId, SecureTalkError};
use securetalk_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("no key on record for account {0}")]
    NotFound(AccountId),

    #[error("account {0} already has a key on record")]
    AlreadyExists(AccountId),

    #[error("key for account {0} is retired or expired")]
    Inactive(AccountId),

    #[error("stored key for account {account} failed integrity check: {source}")]
    Integrity {
        account: AccountId,
        #[source]
        source: CryptoError,
    },

    #[error("key store persistence failed: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl From<KeyStoreError> for SecureTalkError {
    fn from(e: KeyStoreError) -> Self {
        SecureTalkError::Keys(e.to_string())
    }
}
