//! End-to-end properties of the dual-ciphertext protocol.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use proptest::prelude::*;

use securetalk_core::{AccountId, MessageStatus};
use securetalk_crypto::{decrypt_b64, CryptoError};
use securetalk_keys::{KeyCache, KeyStore, MemoryKeyStore, StaticDirectory};
use securetalk_messaging::{
    DecryptOutcome, EncryptedMessage, MessageCrypto, MessageFormat, MessagingError, Placeholder,
};

fn setup() -> (Arc<MemoryKeyStore>, MessageCrypto) {
    let store = Arc::new(MemoryKeyStore::new());
    let crypto = MessageCrypto::new(
        store.clone(),
        Arc::new(StaticDirectory::from_ids([1, 2, 3])),
        KeyCache::default(),
    );
    (store, crypto)
}

fn flip_byte(b64: &str, index: usize) -> String {
    let mut bytes = STANDARD.decode(b64).unwrap();
    bytes[index] ^= 0x01;
    STANDARD.encode(bytes)
}

#[test]
fn account_one_sends_hello_to_account_two() {
    let (_store, crypto) = setup();
    let msg = crypto
        .send_message(AccountId(1), AccountId(2), "hello")
        .unwrap();

    let ct_sender = msg.ciphertext_for_sender.as_deref().unwrap();
    let iv_sender = msg.iv_for_sender.as_deref().unwrap();
    assert!(!msg.ciphertext_for_recipient.is_empty());
    assert!(!msg.iv_for_recipient.is_empty());
    assert!(!ct_sender.is_empty());
    assert!(!iv_sender.is_empty());
    assert_ne!(iv_sender, msg.iv_for_recipient);
    assert_ne!(ct_sender, msg.ciphertext_for_recipient);
    assert_eq!(msg.status, MessageStatus::Sent);
    assert_eq!(msg.format, MessageFormat::Dual);

    assert_eq!(
        crypto.decrypt_for_account(&msg, AccountId(1)).unwrap(),
        DecryptOutcome::Plaintext("hello".into())
    );
    assert_eq!(
        crypto.decrypt_for_account(&msg, AccountId(2)).unwrap(),
        DecryptOutcome::Plaintext("hello".into())
    );
    assert!(matches!(
        crypto.decrypt_for_account(&msg, AccountId(3)),
        Err(MessagingError::Unauthorized { requester: AccountId(3), .. })
    ));
}

#[test]
fn round_trip_edge_plaintexts() {
    let (_store, crypto) = setup();
    let long = "x".repeat(1 << 20);
    for plaintext in ["", "héllo wörld 你好 🔐", long.as_str()] {
        let msg = crypto
            .send_message(AccountId(1), AccountId(2), plaintext)
            .unwrap();
        for reader in [AccountId(1), AccountId(2)] {
            assert_eq!(
                crypto.decrypt_for_account(&msg, reader).unwrap().plaintext(),
                Some(plaintext)
            );
        }
    }
}

#[test]
fn ivs_unique_across_ten_thousand_sends() {
    let (_store, crypto) = setup();
    let mut seen = HashSet::with_capacity(20_000);
    for i in 0..10_000 {
        let msg = crypto
            .send_message(AccountId(1), AccountId(2), &format!("m{i}"))
            .unwrap();
        assert!(seen.insert(msg.iv_for_recipient.clone()));
        assert!(seen.insert(msg.iv_for_sender.clone().unwrap()));
    }
    assert_eq!(seen.len(), 20_000);
}

#[test]
fn any_flipped_byte_in_either_slot_is_tamper() {
    let (_store, crypto) = setup();
    let msg = crypto
        .send_message(AccountId(1), AccountId(2), "integrity matters")
        .unwrap();

    let len = STANDARD.decode(&msg.ciphertext_for_recipient).unwrap().len();
    for i in 0..len {
        let mut tampered = msg.clone();
        tampered.ciphertext_for_recipient = flip_byte(&msg.ciphertext_for_recipient, i);
        assert_eq!(
            crypto.decrypt_for_account(&tampered, AccountId(2)).unwrap(),
            DecryptOutcome::Placeholder(Placeholder::Tampered),
            "recipient slot byte {i}"
        );
        // the other slot is unaffected
        assert_eq!(
            crypto
                .decrypt_for_account(&tampered, AccountId(1))
                .unwrap()
                .plaintext(),
            Some("integrity matters")
        );
    }

    let sender_ct = msg.ciphertext_for_sender.clone().unwrap();
    let len = STANDARD.decode(&sender_ct).unwrap().len();
    for i in 0..len {
        let mut tampered = msg.clone();
        tampered.ciphertext_for_sender = Some(flip_byte(&sender_ct, i));
        assert_eq!(
            crypto.decrypt_for_account(&tampered, AccountId(1)).unwrap(),
            DecryptOutcome::Placeholder(Placeholder::Tampered),
            "sender slot byte {i}"
        );
    }
}

#[test]
fn flipped_iv_is_tamper() {
    let (_store, crypto) = setup();
    let mut msg = crypto.send_message(AccountId(1), AccountId(2), "iv").unwrap();
    msg.iv_for_recipient = flip_byte(&msg.iv_for_recipient, 0);
    assert_eq!(
        crypto.decrypt_for_account(&msg, AccountId(2)).unwrap(),
        DecryptOutcome::Placeholder(Placeholder::Tampered)
    );
}

#[test]
fn malformed_rows_become_placeholders() {
    let (_store, crypto) = setup();
    let msg = crypto
        .send_message(AccountId(1), AccountId(2), "shape")
        .unwrap();

    let cases: Vec<(&str, Box<dyn Fn(&mut EncryptedMessage)>)> = vec![
        (
            "truncated below tag",
            Box::new(|m: &mut EncryptedMessage| {
                m.ciphertext_for_recipient = STANDARD.encode([0u8; 5])
            }),
        ),
        (
            "ciphertext not base64",
            Box::new(|m: &mut EncryptedMessage| m.ciphertext_for_recipient = "%%%".into()),
        ),
        (
            "short iv",
            Box::new(|m: &mut EncryptedMessage| {
                m.iv_for_recipient = STANDARD.encode([0u8; 8])
            }),
        ),
    ];

    for (name, mutate) in cases {
        let mut row = msg.clone();
        mutate(&mut row);
        assert_eq!(
            crypto.decrypt_for_account(&row, AccountId(2)).unwrap(),
            DecryptOutcome::Placeholder(Placeholder::Malformed),
            "{name}"
        );
    }
}

#[test]
fn swapped_keys_never_authenticate() {
    let (store, crypto) = setup();
    let msg = crypto
        .send_message(AccountId(1), AccountId(2), "isolated")
        .unwrap();
    let key_1 = store.active_key(AccountId(1)).unwrap().material;
    let key_2 = store.active_key(AccountId(2)).unwrap().material;

    assert_eq!(
        decrypt_b64(
            &msg.ciphertext_for_recipient,
            key_1.as_bytes(),
            &msg.iv_for_recipient
        ),
        Err(CryptoError::AuthenticationFailed)
    );
    assert_eq!(
        decrypt_b64(
            msg.ciphertext_for_sender.as_deref().unwrap(),
            key_2.as_bytes(),
            msg.iv_for_sender.as_deref().unwrap()
        ),
        Err(CryptoError::AuthenticationFailed)
    );
}

#[test]
fn legacy_single_rows() {
    let (_store, crypto) = setup();
    let dual = crypto
        .send_message(AccountId(1), AccountId(2), "old")
        .unwrap();
    let legacy = EncryptedMessage {
        ciphertext_for_sender: None,
        iv_for_sender: None,
        format: MessageFormat::LegacySingle,
        ..dual
    };

    assert_eq!(
        crypto
            .decrypt_for_account(&legacy, AccountId(2))
            .unwrap()
            .plaintext(),
        Some("old")
    );
    assert_eq!(
        crypto.decrypt_for_account(&legacy, AccountId(1)).unwrap(),
        DecryptOutcome::Placeholder(Placeholder::Unreadable)
    );
    assert!(matches!(
        crypto.decrypt_for_account(&legacy, AccountId(3)),
        Err(MessagingError::Unauthorized { .. })
    ));
}

#[test]
fn concurrent_first_sends_share_one_key() {
    let (store, crypto) = setup();
    let crypto = Arc::new(crypto);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let crypto = Arc::clone(&crypto);
            std::thread::spawn(move || {
                crypto
                    .send_message(AccountId(1), AccountId(2), &format!("race {i}"))
                    .unwrap()
            })
        })
        .collect();
    let messages: Vec<EncryptedMessage> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(store.len(), 2);
    crypto.cache().clear();
    for (i, msg) in messages.iter().enumerate() {
        let expected = format!("race {i}");
        for reader in [AccountId(1), AccountId(2)] {
            assert_eq!(
                crypto.decrypt_for_account(msg, reader).unwrap().plaintext(),
                Some(expected.as_str())
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn both_participants_recover_plaintext(plaintext in ".{0,512}") {
        let (_store, crypto) = setup();
        let msg = crypto.send_message(AccountId(1), AccountId(2), &plaintext).unwrap();
        for reader in [AccountId(1), AccountId(2)] {
            let outcome = crypto.decrypt_for_account(&msg, reader).unwrap();
            prop_assert_eq!(outcome.plaintext(), Some(plaintext.as_str()));
        }
    }

    #[test]
    fn outsiders_always_unauthorized(outsider in 3u64..10_000) {
        let (_store, crypto) = setup();
        let msg = crypto.send_message(AccountId(1), AccountId(2), "private").unwrap();
        let is_unauthorized = matches!(
            crypto.decrypt_for_account(&msg, AccountId(outsider)),
            Err(MessagingError::Unauthorized { .. })
        );
        prop_assert!(is_unauthorized);
    }
}
