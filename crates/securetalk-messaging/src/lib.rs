//! securetalk-messaging: dual-ciphertext messages
//!
//! Every message is encrypted twice, once under each participant's key:
//! ```text
//! plaintext ──▶ AES-256-GCM(recipient key, iv_r) ──▶ ciphertextForRecipient / ivForRecipient
//!           └─▶ AES-256-GCM(sender key,    iv_s) ──▶ ciphertextForSender    / ivForSender
//! ```
//! Either party decrypts its own slot with its own key. Decryption problems
//! caused by stored data come back as [`Placeholder`]s, never as errors, so a
//! single bad row cannot break a conversation listing.

pub mod conversation;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod outcome;
pub mod store;

pub use conversation::{ConversationEntry, ConversationSummary, Conversations};
pub use error::MessagingError;
pub use message::{EncryptedMessage, MessageFormat};
pub use orchestrator::MessageCrypto;
pub use outcome::{DecryptOutcome, Placeholder};
pub use store::{JsonMessageStore, MemoryMessageStore, MessageStore};
