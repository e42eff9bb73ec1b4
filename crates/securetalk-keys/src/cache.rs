//! Key cache: bounded-lifetime copies of key material, so repeated
//! encrypt/decrypt calls skip the key store.
//!
//! The cache is never a source of truth. A key deactivated in the store
//! can still be served from here for up to one TTL; callers that need
//! revocation to take effect immediately call [`KeyCache::invalidate`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use securetalk_core::AccountId;
use securetalk_crypto::KeyMaterial;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct CachedKeyEntry {
    material: KeyMaterial,
    expires_at: Instant,
}

impl CachedKeyEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe per-process key cache with lazy TTL expiry.
#[derive(Debug)]
pub struct KeyCache {
    entries: Mutex<HashMap<AccountId, CachedKeyEntry>>,
    ttl: Duration,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl KeyCache {
    pub fn new(ttl: Duration) -> Self {
        KeyCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached key for `account`, if present and not expired. Expired entries
    /// are dropped on the way out.
    pub fn get(&self, account: AccountId) -> Option<KeyMaterial> {
        let mut map = self.entries();
        if let Some(entry) = map.get(&account) {
            if entry.is_live(Instant::now()) {
                return Some(entry.material.clone());
            }
            map.remove(&account);
        }
        None
    }

    pub fn put(&self, account: AccountId, key: KeyMaterial) {
        self.put_with_ttl(account, key, self.ttl);
    }

    pub fn put_with_ttl(&self, account: AccountId, key: KeyMaterial, ttl: Duration) {
        let entry = CachedKeyEntry {
            material: key,
            expires_at: Instant::now() + ttl,
        };
        self.entries().insert(account, entry);
    }

    pub fn invalidate(&self, account: AccountId) {
        self.entries().remove(&account);
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop every expired entry. Call periodically to bound growth.
    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries().retain(|_, entry| entry.is_live(now));
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<AccountId, CachedKeyEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
