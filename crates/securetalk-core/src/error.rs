use thiserror::Error;

pub type SecureTalkResult<T> = Result<T, SecureTalkError>;

#[derive(Debug, Error)]
pub enum SecureTalkError {
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("key store error: {0}")]
    Keys(String),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
