//! Bulk key provisioning: make sure every registered account has a key.
//!
//! Runs through `get_or_issue`, so it is idempotent and safe alongside live
//! traffic that may be issuing keys for the same accounts.

use serde::Serialize;

use securetalk_core::AccountId;

use crate::directory::AccountDirectory;
use crate::error::KeyStoreError;
use crate::store::KeyStore;

/// Per-run counts. `retired` lists accounts whose key is inactive or expired;
/// they are reported, never re-keyed. `failed` holds accounts whose row could
/// not be read or written, with the error text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub issued: Vec<AccountId>,
    pub existing: usize,
    pub retired: Vec<AccountId>,
    pub failed: Vec<(AccountId, String)>,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.issued.len() + self.existing + self.retired.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Issue keys for every account in `directory` that lacks one.
///
/// A store failure for one account is recorded in `failed` and the pass
/// moves on. An account keyed by concurrent traffic between the lookup and
/// the issue counts as issued.
pub fn ensure_keys_for_all_accounts(
    store: &dyn KeyStore,
    directory: &dyn AccountDirectory,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for account in directory.accounts() {
        let had_key = match store.find_key(account) {
            Ok(found) => found.is_some(),
            Err(e) => {
                record_failure(&mut report, account, &e);
                continue;
            }
        };
        match store.get_or_issue(account) {
            Ok(_) if !had_key => {
                tracing::debug!(account = %account, "reconcile: issued key");
                report.issued.push(account);
            }
            Ok(_) => report.existing += 1,
            Err(KeyStoreError::Inactive(_)) => {
                tracing::warn!(account = %account, "reconcile: account key is retired");
                report.retired.push(account);
            }
            Err(e) => record_failure(&mut report, account, &e),
        }
    }

    tracing::info!(
        issued = report.issued.len(),
        existing = report.existing,
        retired = report.retired.len(),
        failed = report.failed.len(),
        "key reconciliation complete"
    );
    report
}

fn record_failure(report: &mut ReconcileReport, account: AccountId, error: &KeyStoreError) {
    tracing::warn!(account = %account, error = %error, "reconcile: account skipped");
    report.failed.push((account, error.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::store::MemoryKeyStore;

    #[test]
    fn issues_missing_keys_once() {
        let store = MemoryKeyStore::new();
        let directory = StaticDirectory::from_ids([1, 2, 3]);
        store.issue_key(AccountId(2)).unwrap();

        let first = ensure_keys_for_all_accounts(&store, &directory);
        assert_eq!(first.issued, vec![AccountId(1), AccountId(3)]);
        assert_eq!(first.existing, 1);
        assert!(first.retired.is_empty());

        let before: Vec<_> = directory
            .accounts()
            .into_iter()
            .map(|a| store.active_key(a).unwrap().material)
            .collect();

        let second = ensure_keys_for_all_accounts(&store, &directory);
        assert!(second.issued.is_empty());
        assert_eq!(second.existing, 3);

        let after: Vec<_> = directory
            .accounts()
            .into_iter()
            .map(|a| store.active_key(a).unwrap().material)
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn retired_accounts_reported_not_rekeyed() {
        let store = MemoryKeyStore::new();
        let directory = StaticDirectory::from_ids([1, 2]);
        store.issue_key(AccountId(1)).unwrap();
        store.deactivate(AccountId(1)).unwrap();

        let report = ensure_keys_for_all_accounts(&store, &directory);
        assert_eq!(report.retired, vec![AccountId(1)]);
        assert_eq!(report.issued, vec![AccountId(2)]);
        assert_eq!(report.total(), 2);
        assert!(!store.find_key(AccountId(1)).unwrap().unwrap().active);
    }

    #[test]
    fn empty_directory_is_noop() {
        let store = MemoryKeyStore::new();
        let report = ensure_keys_for_all_accounts(&store, &StaticDirectory::new());
        assert_eq!(report, ReconcileReport::default());
        assert!(store.is_empty());
    }
}
