pub mod config;
pub mod error;
pub mod types;

pub use error::{SecureTalkError, SecureTalkResult};
pub use types::{now_epoch, AccountId, MessageStatus};
