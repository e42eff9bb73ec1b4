//! Messages written by one process stay readable after a restart.

use std::path::Path;
use std::sync::Arc;

use secrecy::SecretString;
use securetalk_core::{AccountId, MessageStatus};
use securetalk_crypto::KeyWrapper;
use securetalk_keys::{IssuePolicy, JsonKeyStore, KeyCache, KeyStoreError, StaticDirectory};
use securetalk_messaging::{
    Conversations, JsonMessageStore, MessageCrypto, MessageStore, MessagingError,
};

fn open(dir: &Path, secret: &str) -> (Arc<JsonMessageStore>, Conversations) {
    let wrapper = KeyWrapper::new(SecretString::from(secret.to_string()), "persist-salt");
    let keys = JsonKeyStore::open(&dir.join("keys.json"), wrapper, IssuePolicy::default()).unwrap();
    let crypto = MessageCrypto::new(
        Arc::new(keys),
        Arc::new(StaticDirectory::from_ids([1, 2])),
        KeyCache::default(),
    );
    let messages = Arc::new(JsonMessageStore::open(&dir.join("messages.json")).unwrap());
    (
        messages.clone(),
        Conversations::new(Arc::new(crypto), messages),
    )
}

#[test]
fn conversation_readable_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (_, svc) = open(dir.path(), "persist-secret");
        svc.send(AccountId(1), AccountId(2), "before restart").unwrap();
        svc.send(AccountId(2), AccountId(1), "reply").unwrap();
    }

    let (store, svc) = open(dir.path(), "persist-secret");
    let entries = svc.open_conversation(AccountId(1), AccountId(2)).unwrap();
    let texts: Vec<&str> = entries.iter().map(|e| e.content.display_text()).collect();
    assert_eq!(texts, vec!["before restart", "reply"]);

    let statuses: Vec<MessageStatus> = store
        .conversation(AccountId(1), AccountId(2))
        .unwrap()
        .into_iter()
        .map(|m| m.status)
        .collect();
    assert_eq!(statuses, vec![MessageStatus::Sent, MessageStatus::Read]);
}

#[test]
fn wrong_master_secret_degrades_to_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (_, svc) = open(dir.path(), "persist-secret");
        svc.send(AccountId(1), AccountId(2), "secret").unwrap();
    }

    let (_, svc) = open(dir.path(), "another-secret");
    let entries = svc.open_conversation(AccountId(2), AccountId(1)).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].content.plaintext().is_none());
}

#[test]
fn failed_key_issuance_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (store, svc) = open(dir.path(), "persist-secret");

    // A directory in place of the key file makes every key flush fail.
    std::fs::create_dir(dir.path().join("keys.json")).unwrap();

    let err = svc
        .send(AccountId(1), AccountId(2), "never stored")
        .unwrap_err();
    assert!(matches!(
        err,
        MessagingError::KeyUnavailable {
            account: AccountId(1),
            source: KeyStoreError::Persistence(_)
        }
    ));

    assert!(store
        .conversation(AccountId(1), AccountId(2))
        .unwrap()
        .is_empty());
    assert!(store.partners(AccountId(1)).unwrap().is_empty());
    assert!(!dir.path().join("messages.json").exists());
    assert!(svc
        .crypto()
        .key_store()
        .accounts_with_keys()
        .unwrap()
        .is_empty());
}
