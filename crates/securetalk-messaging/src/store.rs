//! Message store: persistence for encrypted message records.
//!
//! Two backends share one in-memory log:
//!   - **Memory**: the log alone.
//!   - **JSON**: the log plus a write-through file flushed atomically via
//!     temp+rename. A failed flush rolls the log back.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use securetalk_core::{AccountId, MessageStatus};

use crate::error::MessagingError;
use crate::message::EncryptedMessage;

pub trait MessageStore: Send + Sync {
    /// Persist a new record. Ids are unique.
    fn insert(&self, message: EncryptedMessage) -> Result<(), MessagingError>;

    fn get(&self, id: Uuid) -> Result<Option<EncryptedMessage>, MessagingError>;

    /// Messages between `a` and `b` in either direction, oldest first.
    /// Messages with equal timestamps keep insertion order.
    fn conversation(
        &self,
        a: AccountId,
        b: AccountId,
    ) -> Result<Vec<EncryptedMessage>, MessagingError>;

    /// Distinct accounts `account` has exchanged messages with, ascending.
    fn partners(&self, account: AccountId) -> Result<Vec<AccountId>, MessagingError>;

    /// Move a message's status forward. Re-applying the current status is a
    /// no-op; moving backwards is rejected.
    fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), MessagingError>;
}

/// Insertion-ordered message log shared by both backends.
#[derive(Debug, Default)]
struct MessageLog {
    messages: Vec<EncryptedMessage>,
}

/// A status change that can be undone.
struct StatusChange {
    index: usize,
    previous: MessageStatus,
}

impl MessageLog {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    fn insert(&mut self, message: EncryptedMessage) -> Result<(), MessagingError> {
        if self.position(message.id).is_some() {
            return Err(anyhow::anyhow!("duplicate message id {}", message.id).into());
        }
        self.messages.push(message);
        Ok(())
    }

    fn get(&self, id: Uuid) -> Option<EncryptedMessage> {
        self.position(id).map(|i| self.messages[i].clone())
    }

    fn conversation(&self, a: AccountId, b: AccountId) -> Vec<EncryptedMessage> {
        let mut found: Vec<EncryptedMessage> = self
            .messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal timestamps
        found.sort_by_key(|m| m.created_at);
        found
    }

    fn partners(&self, account: AccountId) -> Vec<AccountId> {
        self.messages
            .iter()
            .filter_map(|m| m.counterpart(account))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Apply a status change. `Ok(None)` means nothing changed.
    fn set_status(
        &mut self,
        id: Uuid,
        status: MessageStatus,
    ) -> Result<Option<StatusChange>, MessagingError> {
        let index = self
            .position(id)
            .ok_or(MessagingError::MessageNotFound(id))?;
        let message = &mut self.messages[index];
        let previous = message.status;

        if !previous.can_transition_to(status) {
            return Err(MessagingError::InvalidStatusTransition {
                id,
                from: previous,
                to: status,
            });
        }
        if previous == status {
            return Ok(None);
        }
        message.status = status;
        Ok(Some(StatusChange { index, previous }))
    }

    fn undo(&mut self, change: StatusChange) {
        if let Some(message) = self.messages.get_mut(change.index) {
            message.status = change.previous;
        }
    }
}

fn lock(log: &Mutex<MessageLog>) -> MutexGuard<'_, MessageLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process message store.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    log: Mutex<MessageLog>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.log).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for MemoryMessageStore {
    fn insert(&self, message: EncryptedMessage) -> Result<(), MessagingError> {
        lock(&self.log).insert(message)
    }

    fn get(&self, id: Uuid) -> Result<Option<EncryptedMessage>, MessagingError> {
        Ok(lock(&self.log).get(id))
    }

    fn conversation(
        &self,
        a: AccountId,
        b: AccountId,
    ) -> Result<Vec<EncryptedMessage>, MessagingError> {
        Ok(lock(&self.log).conversation(a, b))
    }

    fn partners(&self, account: AccountId) -> Result<Vec<AccountId>, MessagingError> {
        Ok(lock(&self.log).partners(account))
    }

    fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), MessagingError> {
        lock(&self.log).set_status(id, status).map(|_| ())
    }
}

const FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct MessageFile {
    version: u32,
    messages: Vec<EncryptedMessage>,
}

/// Message store persisted to a JSON file.
#[derive(Debug)]
pub struct JsonMessageStore {
    path: PathBuf,
    log: Mutex<MessageLog>,
}

impl JsonMessageStore {
    /// Load or create a message store at `path`. A missing file starts empty.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let messages = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading message store: {}", path.display()))?;
            let file: MessageFile = serde_json::from_str(&content)
                .with_context(|| format!("parsing message store: {}", path.display()))?;
            if file.version != FILE_VERSION {
                anyhow::bail!(
                    "unsupported message store version {} in {}",
                    file.version,
                    path.display()
                );
            }
            file.messages
        } else {
            Vec::new()
        };

        tracing::debug!(path = %path.display(), messages = messages.len(), "opened message store");

        Ok(Self {
            path: path.to_path_buf(),
            log: Mutex::new(MessageLog { messages }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomic write: temp file, then rename over the store.
    fn flush(&self, log: &MessageLog) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating message store dir: {}", parent.display()))?;
        }

        let file = MessageFile {
            version: FILE_VERSION,
            messages: log.messages.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("serializing message store")?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing message store temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming message store: {}", self.path.display()))?;
        Ok(())
    }
}

impl MessageStore for JsonMessageStore {
    fn insert(&self, message: EncryptedMessage) -> Result<(), MessagingError> {
        let mut log = lock(&self.log);
        log.insert(message)?;
        if let Err(e) = self.flush(&log) {
            log.messages.pop();
            return Err(e.into());
        }
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<EncryptedMessage>, MessagingError> {
        Ok(lock(&self.log).get(id))
    }

    fn conversation(
        &self,
        a: AccountId,
        b: AccountId,
    ) -> Result<Vec<EncryptedMessage>, MessagingError> {
        Ok(lock(&self.log).conversation(a, b))
    }

    fn partners(&self, account: AccountId) -> Result<Vec<AccountId>, MessagingError> {
        Ok(lock(&self.log).partners(account))
    }

    fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), MessagingError> {
        let mut log = lock(&self.log);
        let Some(change) = log.set_status(id, status)? else {
            return Ok(());
        };
        if let Err(e) = self.flush(&log) {
            log.undo(change);
            return Err(e.into());
        }
        Ok(())
    }
}
