use serde::{Deserialize, Serialize};
use uuid::Uuid;

use securetalk_core::{AccountId, MessageStatus};

/// Storage layout of a message record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// One ciphertext per participant
    #[default]
    Dual,
    /// Pre-dual rows: only the recipient slot is populated
    LegacySingle,
}

/// A stored message: two independent ciphertexts of the same plaintext.
///
/// Ciphertexts are base64 of `ciphertext || 16-byte tag`, IVs are base64 of
/// 12 random bytes. Only `status` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub id: Uuid,
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub ciphertext_for_recipient: String,
    pub iv_for_recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext_for_sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv_for_sender: Option<String>,
    /// Unix seconds
    pub created_at: u64,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub format: MessageFormat,
}

impl EncryptedMessage {
    pub fn involves(&self, account: AccountId) -> bool {
        self.sender_id == account || self.recipient_id == account
    }

    /// True if the message was exchanged between `a` and `b`, in either direction.
    pub fn is_between(&self, a: AccountId, b: AccountId) -> bool {
        (self.sender_id == a && self.recipient_id == b)
            || (self.sender_id == b && self.recipient_id == a)
    }

    /// The other participant, if `account` is one.
    pub fn counterpart(&self, account: AccountId) -> Option<AccountId> {
        if self.sender_id == account {
            Some(self.recipient_id)
        } else if self.recipient_id == account {
            Some(self.sender_id)
        } else {
            None
        }
    }

    pub fn is_unread_by(&self, account: AccountId) -> bool {
        self.recipient_id == account && self.status == MessageStatus::Sent
    }
}
