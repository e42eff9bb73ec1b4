//! Key store: the durable source of truth for account keys.
//!
//! `MemoryKeyStore` keeps rows in a mutex-guarded map. `JsonKeyStore`
//! (see [`crate::json`]) adds a write-through JSON file on top of the same
//! rules. Both implement [`KeyStore`], so the orchestrator and the
//! reconciliation pass never know which backend they run against.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use securetalk_core::{now_epoch, AccountId};
use securetalk_crypto::generate_key;

use crate::error::KeyStoreError;
use crate::key::AccountKey;

/// Storage backend for per-account keys.
///
/// Every method is synchronous and takes `&self`; implementations use
/// interior locking so one store can be shared behind an `Arc`.
pub trait KeyStore: Send + Sync {
    /// Direct lookup regardless of active/expired state.
    fn find_key(&self, account: AccountId) -> Result<Option<AccountKey>, KeyStoreError>;

    /// Issue a fresh key. Fails with `AlreadyExists` if any row exists.
    fn issue_key(&self, account: AccountId) -> Result<AccountKey, KeyStoreError>;

    /// Retire the account's key. Material is kept for recovery.
    fn deactivate(&self, account: AccountId) -> Result<(), KeyStoreError>;

    /// Atomic insert-if-absent.
    ///
    /// Returns the existing valid key or issues one when no row exists.
    /// A retired or expired row yields `Inactive`; it is never replaced.
    fn get_or_issue(&self, account: AccountId) -> Result<AccountKey, KeyStoreError>;

    /// Every account that has a row, active or not, in ascending order.
    fn accounts_with_keys(&self) -> Result<Vec<AccountId>, KeyStoreError>;

    /// The account's key if it is currently valid.
    fn active_key(&self, account: AccountId) -> Result<AccountKey, KeyStoreError> {
        match self.find_key(account)? {
            None => Err(KeyStoreError::NotFound(account)),
            Some(key) if key.is_valid() => Ok(key),
            Some(_) => Err(KeyStoreError::Inactive(account)),
        }
    }
}

/// How new keys are minted: lifetime applied to `expires_at`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssuePolicy {
    pub lifetime: Option<Duration>,
}

impl IssuePolicy {
    pub fn with_lifetime(lifetime: Option<Duration>) -> Self {
        Self { lifetime }
    }

    /// Mint a new active key for `account`.
    pub fn issue(&self, account: AccountId) -> AccountKey {
        let created_at = now_epoch();
        AccountKey {
            account_id: account,
            material: generate_key(),
            created_at,
            expires_at: self
                .lifetime
                .map(|ttl| created_at.saturating_add(ttl.as_secs())),
            active: true,
        }
    }
}

/// In-process key store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    rows: Mutex<HashMap<AccountId, AccountKey>>,
    policy: IssuePolicy,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: IssuePolicy) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Insert a pre-built row (imports and tests). Overwrites nothing.
    pub fn insert(&self, key: AccountKey) -> Result<(), KeyStoreError> {
        let mut rows = self.rows();
        if rows.contains_key(&key.account_id) {
            return Err(KeyStoreError::AlreadyExists(key.account_id));
        }
        rows.insert(key.account_id, key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<AccountId, AccountKey>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyStore for MemoryKeyStore {
    fn find_key(&self, account: AccountId) -> Result<Option<AccountKey>, KeyStoreError> {
        Ok(self.rows().get(&account).cloned())
    }

    fn issue_key(&self, account: AccountId) -> Result<AccountKey, KeyStoreError> {
        let mut rows = self.rows();
        if rows.contains_key(&account) {
            return Err(KeyStoreError::AlreadyExists(account));
        }
        let key = self.policy.issue(account);
        rows.insert(account, key.clone());
        tracing::info!(account = %account, "issued account key");
        Ok(key)
    }

    fn deactivate(&self, account: AccountId) -> Result<(), KeyStoreError> {
        let mut rows = self.rows();
        let key = rows
            .get_mut(&account)
            .ok_or(KeyStoreError::NotFound(account))?;
        key.active = false;
        tracing::info!(account = %account, "deactivated account key");
        Ok(())
    }

    fn get_or_issue(&self, account: AccountId) -> Result<AccountKey, KeyStoreError> {
        let mut rows = self.rows();
        if let Some(key) = rows.get(&account) {
            return if key.is_valid() {
                Ok(key.clone())
            } else {
                Err(KeyStoreError::Inactive(account))
            };
        }
        let key = self.policy.issue(account);
        rows.insert(account, key.clone());
        tracing::info!(account = %account, "issued account key on first use");
        Ok(key)
    }

    fn accounts_with_keys(&self) -> Result<Vec<AccountId>, KeyStoreError> {
        let mut ids: Vec<AccountId> = self.rows().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
