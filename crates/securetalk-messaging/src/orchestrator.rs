//! Dual-encryption orchestrator.
//!
//! Key resolution goes cache first, then store. Sending may issue a key on
//! first use; reading never does.

use std::sync::Arc;

use securetalk_core::{now_epoch, AccountId, MessageStatus};
use securetalk_crypto::{decrypt_b64, encrypt_b64, generate_iv_b64, CryptoError, KeyMaterial};
use securetalk_keys::{AccountDirectory, AccountKey, KeyCache, KeyStore, KeyStoreError};
use uuid::Uuid;

use crate::error::MessagingError;
use crate::message::{EncryptedMessage, MessageFormat};
use crate::outcome::{DecryptOutcome, Placeholder};

pub struct MessageCrypto {
    store: Arc<dyn KeyStore>,
    directory: Arc<dyn AccountDirectory>,
    cache: KeyCache,
}

impl MessageCrypto {
    pub fn new(
        store: Arc<dyn KeyStore>,
        directory: Arc<dyn AccountDirectory>,
        cache: KeyCache,
    ) -> Self {
        Self {
            store,
            directory,
            cache,
        }
    }

    pub fn directory(&self) -> &dyn AccountDirectory {
        self.directory.as_ref()
    }

    pub fn key_store(&self) -> &dyn KeyStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Encrypt `plaintext` once for each participant.
    ///
    /// The returned record has status `Sent` and is not yet persisted. Any
    /// failure aborts the whole send.
    pub fn send_message(
        &self,
        sender: AccountId,
        recipient: AccountId,
        plaintext: &str,
    ) -> Result<EncryptedMessage, MessagingError> {
        for account in [sender, recipient] {
            if !self.directory.exists(account) {
                return Err(MessagingError::AccountNotFound(account));
            }
        }

        let sender_key = self.key_for_send(sender)?;
        let recipient_key = self.key_for_send(recipient)?;

        let iv_for_recipient = generate_iv_b64();
        let iv_for_sender = generate_iv_b64();

        let ciphertext_for_recipient =
            encrypt_b64(plaintext, recipient_key.as_bytes(), &iv_for_recipient)
                .map_err(MessagingError::Encryption)?;
        let ciphertext_for_sender = encrypt_b64(plaintext, sender_key.as_bytes(), &iv_for_sender)
            .map_err(MessagingError::Encryption)?;

        let message = EncryptedMessage {
            id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            ciphertext_for_recipient,
            iv_for_recipient,
            ciphertext_for_sender: Some(ciphertext_for_sender),
            iv_for_sender: Some(iv_for_sender),
            created_at: now_epoch(),
            status: MessageStatus::Sent,
            format: MessageFormat::Dual,
        };

        tracing::debug!(
            message = %message.id,
            sender = %sender,
            recipient = %recipient,
            "encrypted message for both participants"
        );
        Ok(message)
    }

    /// Decrypt the slot belonging to `requester`.
    ///
    /// Data problems in the stored row come back as placeholders. Only
    /// `Unauthorized` and `KeyUnavailable` are errors.
    pub fn decrypt_for_account(
        &self,
        message: &EncryptedMessage,
        requester: AccountId,
    ) -> Result<DecryptOutcome, MessagingError> {
        if !message.involves(requester) {
            tracing::warn!(
                message = %message.id,
                requester = %requester,
                "decrypt attempted by non-participant"
            );
            return Err(MessagingError::Unauthorized {
                message: message.id,
                requester,
            });
        }

        let (ciphertext, iv) = if requester == message.sender_id {
            match (&message.ciphertext_for_sender, &message.iv_for_sender) {
                (Some(ct), Some(iv)) => (ct.as_str(), iv.as_str()),
                _ if message.format == MessageFormat::LegacySingle => {
                    if requester != message.recipient_id {
                        tracing::debug!(message = %message.id, "legacy row has no sender slot");
                        return Ok(Placeholder::Unreadable.into());
                    }
                    (
                        message.ciphertext_for_recipient.as_str(),
                        message.iv_for_recipient.as_str(),
                    )
                }
                _ => {
                    tracing::warn!(message = %message.id, "dual-format row is missing the sender slot");
                    return Ok(Placeholder::Malformed.into());
                }
            }
        } else {
            (
                message.ciphertext_for_recipient.as_str(),
                message.iv_for_recipient.as_str(),
            )
        };

        let key = self.key_for_read(requester)?;

        match decrypt_b64(ciphertext, key.as_bytes(), iv) {
            Ok(plaintext) => Ok(DecryptOutcome::Plaintext(plaintext)),
            Err(CryptoError::AuthenticationFailed) => {
                tracing::warn!(
                    message = %message.id,
                    account = %requester,
                    "message failed authentication"
                );
                Ok(Placeholder::Tampered.into())
            }
            Err(e) => {
                tracing::warn!(
                    message = %message.id,
                    account = %requester,
                    error = %e,
                    "stored message is malformed"
                );
                Ok(Placeholder::Malformed.into())
            }
        }
    }

    /// Retire `account`'s key and drop it from the cache so the retirement
    /// takes effect immediately in this process.
    pub fn revoke_key(&self, account: AccountId) -> Result<(), MessagingError> {
        self.store
            .deactivate(account)
            .map_err(|source| MessagingError::KeyUnavailable { account, source })?;
        self.cache.invalidate(account);
        Ok(())
    }

    fn key_for_send(&self, account: AccountId) -> Result<KeyMaterial, MessagingError> {
        self.resolve_key(account, |store| store.get_or_issue(account))
    }

    fn key_for_read(&self, account: AccountId) -> Result<KeyMaterial, MessagingError> {
        self.resolve_key(account, |store| store.active_key(account))
    }

    fn resolve_key<F>(&self, account: AccountId, load: F) -> Result<KeyMaterial, MessagingError>
    where
        F: FnOnce(&dyn KeyStore) -> Result<AccountKey, KeyStoreError>,
    {
        if let Some(material) = self.cache.get(account) {
            tracing::debug!(account = %account, "key cache hit");
            return Ok(material);
        }
        tracing::debug!(account = %account, "key cache miss");

        let key = load(self.store.as_ref()).map_err(|source| {
            tracing::warn!(account = %account, error = %source, "account key unavailable");
            MessagingError::KeyUnavailable { account, source }
        })?;
        self.cache.put(account, key.material.clone());
        Ok(key.material)
    }
}

impl std::fmt::Debug for MessageCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCrypto")
            .field("cache_entries", &self.cache.len())
            .finish()
    }
}
