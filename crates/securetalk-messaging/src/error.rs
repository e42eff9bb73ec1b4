use securetalk_core::{AccountId, MessageStatus, SecureTalkError};
use securetalk_crypto::CryptoError;
use securetalk_keys::KeyStoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("account {requester} is not a participant of message {message}")]
    Unauthorized { message: Uuid, requester: AccountId },

    #[error("account {0} does not exist")]
    AccountNotFound(AccountId),

    #[error("no usable key for account {account}: {source}")]
    KeyUnavailable {
        account: AccountId,
        #[source]
        source: KeyStoreError,
    },

    #[error("encryption failed: {0}")]
    Encryption(#[source] CryptoError),

    #[error("message {0} not found")]
    MessageNotFound(Uuid),

    #[error("message {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("message store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<MessagingError> for SecureTalkError {
    fn from(e: MessagingError) -> Self {
        SecureTalkError::Messaging(e.to_string())
    }
}
