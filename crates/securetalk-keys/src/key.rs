use securetalk_core::{now_epoch, AccountId};
use securetalk_crypto::KeyMaterial;

/// One account's encryption key plus lifecycle metadata.
#[derive(Debug, Clone)]
pub struct AccountKey {
    pub account_id: AccountId,
    /// Raw 256-bit key. Redacted in `Debug`, zeroized on drop.
    pub material: KeyMaterial,
    /// Unix timestamp of issuance
    pub created_at: u64,
    /// Unix timestamp after which the key is no longer valid (None = never)
    pub expires_at: Option<u64>,
    /// Cleared when the key is retired
    pub active: bool,
}

impl AccountKey {
    /// Valid iff active and not past `expires_at` at `now`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.active && self.expires_at.map_or(true, |exp| now < exp)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_epoch())
    }
}
