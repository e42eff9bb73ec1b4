//! securetalk-keys: per-account key lifecycle
//!
//! Lookup path used by the message orchestrator:
//! ```text
//! KeyCache (TTL, per process) ──miss──▶ KeyStore (source of truth) ──absent──▶ get_or_issue
//! ```
//!
//! Exactly one key row exists per account. Rows are retired by clearing
//! `active`, never overwritten, so older ciphertexts stay recoverable.

pub mod cache;
pub mod directory;
pub mod error;
pub mod json;
pub mod key;
pub mod reconcile;
pub mod store;

pub use cache::{KeyCache, DEFAULT_CACHE_TTL};
pub use directory::{AccountDirectory, AccountRecord, StaticDirectory};
pub use error::KeyStoreError;
pub use json::JsonKeyStore;
pub use key::AccountKey;
pub use reconcile::{ensure_keys_for_all_accounts, ReconcileReport};
pub use store::{IssuePolicy, KeyStore, MemoryKeyStore};
