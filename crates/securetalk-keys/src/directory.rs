//! Account directory: which accounts exist.
//!
//! The real user registry lives outside this crate. The orchestrator and the
//! reconciliation pass only need existence checks and a listing, which is
//! what [`AccountDirectory`] exposes. [`StaticDirectory`] is the file-backed
//! implementation used by the CLI and the tests.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use securetalk_core::AccountId;

pub trait AccountDirectory: Send + Sync {
    fn exists(&self, account: AccountId) -> bool;

    /// Every registered account, ascending.
    fn accounts(&self) -> Vec<AccountId>;
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub username: String,
}

/// Directory loaded once from a JSON array of `{ "id", "username" }`.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    accounts: BTreeMap<AccountId, AccountRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        Self {
            accounts: records.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    /// Directory with the given ids and generated usernames.
    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self::from_records(ids.into_iter().map(|id| AccountRecord {
            id: AccountId(id),
            username: format!("user{id}"),
        }))
    }

    /// Load from a JSON file. A missing file yields an empty directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "accounts file not found, directory is empty");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading accounts file: {}", path.display()))?;
        let records: Vec<AccountRecord> = serde_json::from_str(&content)
            .with_context(|| format!("parsing accounts file: {}", path.display()))?;
        Ok(Self::from_records(records))
    }

    /// Register an account, replacing any record with the same id.
    pub fn add(&mut self, record: AccountRecord) {
        self.accounts.insert(record.id, record);
    }

    pub fn find(&self, account: AccountId) -> Option<&AccountRecord> {
        self.accounts.get(&account)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&AccountRecord> {
        self.accounts.values().find(|r| r.username == username)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountDirectory for StaticDirectory {
    fn exists(&self, account: AccountId) -> bool {
        self.accounts.contains_key(&account)
    }

    fn accounts(&self) -> Vec<AccountId> {
        self.accounts.keys().copied().collect()
    }
}
