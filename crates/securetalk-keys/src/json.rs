//! JSON-file key store.
//!
//! The whole file is loaded into memory on open. Every mutation is written
//! through with an atomic temp+rename; if the write fails the in-memory
//! change is rolled back so memory never runs ahead of disk.
//!
//! Key material is stored wrapped by [`KeyWrapper`], bound to the row's
//! account id, and only unwrapped on read. A corrupted row, or one carrying
//! another account's wrapped key, surfaces as `Integrity` for that account
//! without preventing the store from opening.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use securetalk_core::AccountId;
use securetalk_crypto::KeyWrapper;

use crate::error::KeyStoreError;
use crate::key::AccountKey;
use crate::store::{IssuePolicy, KeyStore};

// v2: wrapped keys are bound to their account id
const FILE_VERSION: u32 = 2;

/// On-disk form of one key row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredKey {
    account_id: AccountId,
    /// base64(hmac || key), wrapped with the account id as context
    wrapped_key: String,
    created_at: u64,
    #[serde(default)]
    expires_at: Option<u64>,
    active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    keys: Vec<StoredKey>,
}

fn owner(account: AccountId) -> [u8; 8] {
    account.0.to_be_bytes()
}

pub struct JsonKeyStore {
    path: PathBuf,
    wrapper: KeyWrapper,
    policy: IssuePolicy,
    rows: Mutex<BTreeMap<AccountId, StoredKey>>,
}

impl JsonKeyStore {
    /// Load or create a key store at `path`. A missing file starts empty.
    pub fn open(path: &Path, wrapper: KeyWrapper, policy: IssuePolicy) -> anyhow::Result<Self> {
        let rows = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading key store: {}", path.display()))?;
            let file: KeyFile = serde_json::from_str(&content)
                .with_context(|| format!("parsing key store: {}", path.display()))?;
            if file.version != FILE_VERSION {
                anyhow::bail!(
                    "unsupported key store version {} in {}",
                    file.version,
                    path.display()
                );
            }
            file.keys
                .into_iter()
                .map(|row| (row.account_id, row))
                .collect()
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), keys = rows.len(), "opened key store");

        Ok(Self {
            path: path.to_path_buf(),
            wrapper,
            policy,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<AccountId, StoredKey>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn to_stored(&self, key: &AccountKey) -> Result<StoredKey, KeyStoreError> {
        let wrapped_key = self
            .wrapper
            .wrap_for(&owner(key.account_id), &key.material)
            .map_err(|source| KeyStoreError::Integrity {
                account: key.account_id,
                source,
            })?;
        Ok(StoredKey {
            account_id: key.account_id,
            wrapped_key,
            created_at: key.created_at,
            expires_at: key.expires_at,
            active: key.active,
        })
    }

    fn to_account_key(&self, row: &StoredKey) -> Result<AccountKey, KeyStoreError> {
        let material =
            self.wrapper
                .unwrap_for(&owner(row.account_id), &row.wrapped_key)
                .map_err(|source| KeyStoreError::Integrity {
                    account: row.account_id,
                    source,
                })?;
        Ok(AccountKey {
            account_id: row.account_id,
            material,
            created_at: row.created_at,
            expires_at: row.expires_at,
            active: row.active,
        })
    }

    /// Issue and persist a new row. Caller holds the lock and has checked
    /// that no row exists.
    fn insert_new(
        &self,
        rows: &mut BTreeMap<AccountId, StoredKey>,
        account: AccountId,
    ) -> Result<AccountKey, KeyStoreError> {
        let key = self.policy.issue(account);
        rows.insert(account, self.to_stored(&key)?);
        if let Err(e) = self.flush(rows) {
            rows.remove(&account);
            return Err(e.into());
        }
        Ok(key)
    }

    /// Atomic write: temp file, then rename over the store.
    fn flush(&self, rows: &BTreeMap<AccountId, StoredKey>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating key store dir: {}", parent.display()))?;
        }

        let file = KeyFile {
            version: FILE_VERSION,
            keys: rows.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file).context("serializing key store")?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing key store temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming key store: {}", self.path.display()))?;
        Ok(())
    }
}

impl std::fmt::Debug for JsonKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonKeyStore")
            .field("path", &self.path)
            .field("keys", &self.rows().len())
            .finish()
    }
}

impl KeyStore for JsonKeyStore {
    fn find_key(&self, account: AccountId) -> Result<Option<AccountKey>, KeyStoreError> {
        self.rows()
            .get(&account)
            .map(|row| self.to_account_key(row))
            .transpose()
    }

    fn issue_key(&self, account: AccountId) -> Result<AccountKey, KeyStoreError> {
        let mut rows = self.rows();
        if rows.contains_key(&account) {
            return Err(KeyStoreError::AlreadyExists(account));
        }
        let key = self.insert_new(&mut rows, account)?;
        tracing::info!(account = %account, "issued account key");
        Ok(key)
    }

    fn deactivate(&self, account: AccountId) -> Result<(), KeyStoreError> {
        let mut rows = self.rows();
        let row = rows
            .get_mut(&account)
            .ok_or(KeyStoreError::NotFound(account))?;
        if !row.active {
            return Ok(());
        }
        row.active = false;

        if let Err(e) = self.flush(&rows) {
            if let Some(row) = rows.get_mut(&account) {
                row.active = true;
            }
            return Err(e.into());
        }
        tracing::info!(account = %account, "deactivated account key");
        Ok(())
    }

    fn get_or_issue(&self, account: AccountId) -> Result<AccountKey, KeyStoreError> {
        let mut rows = self.rows();
        if let Some(row) = rows.get(&account) {
            let key = self.to_account_key(row)?;
            return if key.is_valid() {
                Ok(key)
            } else {
                Err(KeyStoreError::Inactive(account))
            };
        }
        let key = self.insert_new(&mut rows, account)?;
        tracing::info!(account = %account, "issued account key on first use");
        Ok(key)
    }

    fn accounts_with_keys(&self) -> Result<Vec<AccountId>, KeyStoreError> {
        Ok(self.rows().keys().copied().collect())
    }
}
