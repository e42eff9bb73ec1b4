//! Conversation service: encrypt-and-persist on send, decrypt-and-mark-read
//! when a participant opens a conversation.

use std::sync::Arc;

use uuid::Uuid;

use securetalk_core::{AccountId, MessageStatus};

use crate::error::MessagingError;
use crate::message::EncryptedMessage;
use crate::orchestrator::MessageCrypto;
use crate::outcome::{DecryptOutcome, Placeholder};
use crate::store::MessageStore;

/// One message as seen by a viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub sender_id: AccountId,
    pub recipient_id: AccountId,
    pub created_at: u64,
    pub status: MessageStatus,
    pub content: DecryptOutcome,
}

/// One row of a viewer's conversation list.
///
/// `last` is the newest message decrypted for the viewer (a placeholder if
/// it cannot be read); `unread` counts messages the viewer received and has
/// not read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub partner: AccountId,
    pub last: Option<ConversationEntry>,
    pub last_activity: u64,
    pub unread: usize,
}

pub struct Conversations {
    crypto: Arc<MessageCrypto>,
    store: Arc<dyn MessageStore>,
}

impl Conversations {
    pub fn new(crypto: Arc<MessageCrypto>, store: Arc<dyn MessageStore>) -> Self {
        Self { crypto, store }
    }

    pub fn crypto(&self) -> &MessageCrypto {
        &self.crypto
    }

    /// Encrypt for both participants and persist. Nothing is stored if
    /// either step fails.
    pub fn send(
        &self,
        sender: AccountId,
        recipient: AccountId,
        plaintext: &str,
    ) -> Result<EncryptedMessage, MessagingError> {
        let message = self.crypto.send_message(sender, recipient, plaintext)?;
        self.store.insert(message.clone())?;
        tracing::info!(
            message = %message.id,
            sender = %sender,
            recipient = %recipient,
            "message stored"
        );
        Ok(message)
    }

    /// Decrypt one stored message for `viewer`.
    pub fn read(&self, id: Uuid, viewer: AccountId) -> Result<DecryptOutcome, MessagingError> {
        let message = self
            .store
            .get(id)?
            .ok_or(MessagingError::MessageNotFound(id))?;
        self.crypto.decrypt_for_account(&message, viewer)
    }

    /// Messages between `viewer` and `partner`, oldest first, decrypted for
    /// `viewer`. Messages the viewer received are marked `Read`.
    ///
    /// Rows that cannot be decrypted appear as placeholders; a missing
    /// viewer key degrades every row to `Unreadable` instead of failing.
    pub fn open_conversation(
        &self,
        viewer: AccountId,
        partner: AccountId,
    ) -> Result<Vec<ConversationEntry>, MessagingError> {
        self.require_accounts(viewer, partner)?;

        let messages = self.store.conversation(viewer, partner)?;
        let mut entries = Vec::with_capacity(messages.len());

        for message in messages {
            let mut entry = self.entry_for(&message, viewer)?;
            if message.is_unread_by(viewer) {
                self.store.set_status(message.id, MessageStatus::Read)?;
                entry.status = MessageStatus::Read;
            }
            entries.push(entry);
        }

        Ok(entries)
    }

    /// One summary per conversation partner, most recent activity first.
    /// Statuses are left untouched.
    pub fn summaries(
        &self,
        viewer: AccountId,
    ) -> Result<Vec<ConversationSummary>, MessagingError> {
        self.require_accounts(viewer, viewer)?;

        let mut summaries = Vec::new();
        for partner in self.store.partners(viewer)? {
            let messages = self.store.conversation(viewer, partner)?;
            let unread = messages.iter().filter(|m| m.is_unread_by(viewer)).count();
            let last = messages
                .last()
                .map(|message| self.entry_for(message, viewer))
                .transpose()?;

            summaries.push(ConversationSummary {
                partner,
                last_activity: last.as_ref().map_or(0, |entry| entry.created_at),
                last,
                unread,
            });
        }

        summaries.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then(a.partner.cmp(&b.partner))
        });
        Ok(summaries)
    }

    /// Mark every message `viewer` received from `partner` as `Read`.
    /// Returns how many changed.
    pub fn mark_conversation_read(
        &self,
        viewer: AccountId,
        partner: AccountId,
    ) -> Result<usize, MessagingError> {
        self.require_accounts(viewer, partner)?;

        let mut marked = 0;
        for message in self.store.conversation(viewer, partner)? {
            if message.is_unread_by(viewer) {
                self.store.set_status(message.id, MessageStatus::Read)?;
                marked += 1;
            }
        }
        tracing::debug!(viewer = %viewer, partner = %partner, marked, "conversation marked read");
        Ok(marked)
    }

    /// Accounts `viewer` has exchanged messages with.
    pub fn partners(&self, viewer: AccountId) -> Result<Vec<AccountId>, MessagingError> {
        self.require_accounts(viewer, viewer)?;
        self.store.partners(viewer)
    }

    /// Decrypt `message` for `viewer`, degrading a missing viewer key to
    /// `Unreadable`.
    fn entry_for(
        &self,
        message: &EncryptedMessage,
        viewer: AccountId,
    ) -> Result<ConversationEntry, MessagingError> {
        let content = match self.crypto.decrypt_for_account(message, viewer) {
            Ok(outcome) => outcome,
            Err(MessagingError::KeyUnavailable { account, source }) => {
                tracing::warn!(
                    message = %message.id,
                    account = %account,
                    error = %source,
                    "showing placeholder: viewer key unavailable"
                );
                Placeholder::Unreadable.into()
            }
            Err(e) => return Err(e),
        };

        Ok(ConversationEntry {
            id: message.id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            created_at: message.created_at,
            status: message.status,
            content,
        })
    }

    fn require_accounts(&self, a: AccountId, b: AccountId) -> Result<(), MessagingError> {
        for account in [a, b] {
            if !self.crypto.directory().exists(account) {
                return Err(MessagingError::AccountNotFound(account));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMessageStore;
    use securetalk_keys::{KeyCache, MemoryKeyStore, StaticDirectory};

    fn service() -> (Arc<MemoryMessageStore>, Conversations) {
        let crypto = Arc::new(MessageCrypto::new(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(StaticDirectory::from_ids([1, 2, 3])),
            KeyCache::default(),
        ));
        let store = Arc::new(MemoryMessageStore::new());
        (store.clone(), Conversations::new(crypto, store))
    }

    #[test]
    fn open_marks_received_messages_read() {
        let (store, svc) = service();
        let to_2 = svc.send(AccountId(1), AccountId(2), "hello").unwrap();
        let to_1 = svc.send(AccountId(2), AccountId(1), "hi back").unwrap();

        let entries = svc.open_conversation(AccountId(2), AccountId(1)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content.plaintext(), Some("hello"));
        assert_eq!(entries[1].content.plaintext(), Some("hi back"));
        assert_eq!(entries[0].status, MessageStatus::Read);

        assert_eq!(
            store.get(to_2.id).unwrap().unwrap().status,
            MessageStatus::Read
        );
        // the viewer's own outgoing message is untouched
        assert_eq!(
            store.get(to_1.id).unwrap().unwrap().status,
            MessageStatus::Sent
        );
    }

    #[test]
    fn one_bad_row_does_not_break_listing() {
        let (store, svc) = service();
        svc.send(AccountId(1), AccountId(2), "first").unwrap();

        let mut broken = svc
            .crypto()
            .send_message(AccountId(1), AccountId(2), "second")
            .unwrap();
        broken.iv_for_recipient = "not base64!".into();
        store.insert(broken).unwrap();

        svc.send(AccountId(1), AccountId(2), "third").unwrap();

        let entries = svc.open_conversation(AccountId(2), AccountId(1)).unwrap();
        let shown: Vec<&str> = entries.iter().map(|e| e.content.display_text()).collect();
        assert_eq!(
            shown,
            vec!["first", Placeholder::Malformed.text(), "third"]
        );
    }

    #[test]
    fn mark_read_counts_and_is_idempotent() {
        let (_store, svc) = service();
        svc.send(AccountId(1), AccountId(2), "a").unwrap();
        svc.send(AccountId(1), AccountId(2), "b").unwrap();
        svc.send(AccountId(2), AccountId(1), "c").unwrap();

        assert_eq!(
            svc.mark_conversation_read(AccountId(2), AccountId(1))
                .unwrap(),
            2
        );
        assert_eq!(
            svc.mark_conversation_read(AccountId(2), AccountId(1))
                .unwrap(),
            0
        );
    }

    #[test]
    fn partners_and_unknown_accounts() {
        let (_store, svc) = service();
        svc.send(AccountId(1), AccountId(2), "a").unwrap();
        svc.send(AccountId(3), AccountId(1), "b").unwrap();

        assert_eq!(
            svc.partners(AccountId(1)).unwrap(),
            vec![AccountId(2), AccountId(3)]
        );
        assert!(matches!(
            svc.partners(AccountId(99)),
            Err(MessagingError::AccountNotFound(_))
        ));
        assert!(matches!(
            svc.open_conversation(AccountId(1), AccountId(99)),
            Err(MessagingError::AccountNotFound(_))
        ));
    }

    #[test]
    fn summaries_do_not_mark_read() {
        let (store, svc) = service();
        svc.send(AccountId(2), AccountId(1), "one").unwrap();
        let latest = svc.send(AccountId(2), AccountId(1), "two").unwrap();
        svc.send(AccountId(1), AccountId(3), "to carol").unwrap();

        let summaries = svc.summaries(AccountId(1)).unwrap();
        assert_eq!(summaries.len(), 2);

        let with_2 = summaries
            .iter()
            .find(|s| s.partner == AccountId(2))
            .unwrap();
        assert_eq!(with_2.unread, 2);
        let last = with_2.last.as_ref().unwrap();
        assert_eq!(last.id, latest.id);
        assert_eq!(last.content.plaintext(), Some("two"));
        assert_eq!(with_2.last_activity, last.created_at);

        let with_3 = summaries
            .iter()
            .find(|s| s.partner == AccountId(3))
            .unwrap();
        assert_eq!(with_3.unread, 0);

        assert_eq!(
            store.get(latest.id).unwrap().unwrap().status,
            MessageStatus::Sent
        );

        svc.open_conversation(AccountId(1), AccountId(2)).unwrap();
        let after = svc.summaries(AccountId(1)).unwrap();
        assert!(after.iter().all(|s| s.unread == 0));
    }

    #[test]
    fn summary_with_bad_last_row_shows_placeholder() {
        let (store, svc) = service();
        svc.send(AccountId(1), AccountId(2), "fine").unwrap();
        let mut broken = svc
            .crypto()
            .send_message(AccountId(1), AccountId(2), "broken")
            .unwrap();
        broken.ciphertext_for_recipient = "not base64!".into();
        store.insert(broken).unwrap();

        let summaries = svc.summaries(AccountId(2)).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].last.as_ref().unwrap().content,
            DecryptOutcome::Placeholder(Placeholder::Malformed)
        );
        assert_eq!(summaries[0].unread, 2);
        assert!(matches!(
            svc.summaries(AccountId(99)),
            Err(MessagingError::AccountNotFound(_))
        ));
    }

    #[test]
    fn read_single_message() {
        let (_store, svc) = service();
        let msg = svc.send(AccountId(1), AccountId(2), "x").unwrap();

        assert_eq!(
            svc.read(msg.id, AccountId(1)).unwrap().plaintext(),
            Some("x")
        );
        assert!(matches!(
            svc.read(msg.id, AccountId(3)),
            Err(MessagingError::Unauthorized { .. })
        ));
        assert!(matches!(
            svc.read(Uuid::new_v4(), AccountId(1)),
            Err(MessagingError::MessageNotFound(_))
        ));
    }
}
