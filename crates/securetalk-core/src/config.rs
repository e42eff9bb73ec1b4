use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SecureTalkError, SecureTalkResult};

/// Environment variable holding the key-wrapping master secret
pub const MASTER_SECRET_ENV: &str = "SECURETALK_MASTER_SECRET";

/// Environment variable holding the key-wrapping salt
pub const KEY_SALT_ENV: &str = "SECURETALK_KEY_SALT";

/// Top-level configuration (loaded from securetalk.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureTalkConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub keys: KeysConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Locations of the JSON-backed stores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for relative store paths
    pub data_dir: PathBuf,
    /// Account key table
    pub keys_file: PathBuf,
    /// Encrypted message log
    pub messages_file: PathBuf,
    /// Account directory (JSON array of `{ "id": .., "username": .. }`)
    pub accounts_file: PathBuf,
}

/// Key management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Key cache TTL in seconds (default: 300)
    pub cache_ttl_secs: u64,
    /// Master secret for key wrapping. Never serialized back out.
    #[serde(skip_serializing, deserialize_with = "deserialize_secret")]
    pub master_secret: Option<SecretString>,
    /// Salt mixed into the key-wrapping HMAC
    pub salt: Option<String>,
    /// Lifetime of newly issued keys in seconds (default: none, keys never expire)
    pub default_key_lifetime_secs: Option<u64>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.local/share/securetalk"),
            keys_file: PathBuf::from("keys.json"),
            messages_file: PathBuf::from("messages.json"),
            accounts_file: PathBuf::from("accounts.json"),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            master_secret: None,
            salt: None,
            default_key_lifetime_secs: None,
        }
    }
}

impl StorageConfig {
    /// Resolve a store path against `data_dir` (absolute paths are kept as-is).
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            expand_home(&self.data_dir).join(file)
        }
    }

    pub fn keys_path(&self) -> PathBuf {
        self.resolve(&self.keys_file)
    }

    pub fn messages_path(&self) -> PathBuf {
        self.resolve(&self.messages_file)
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.resolve(&self.accounts_file)
    }
}

fn parse_error(path: &Path, e: toml::de::Error) -> SecureTalkError {
    SecureTalkError::Config(format!("parsing {}: {e}", path.display()))
}

impl SecureTalkConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> SecureTalkResult<Self> {
        toml::from_str(content).map_err(|e| SecureTalkError::Config(e.to_string()))
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. The caller reports the missing file once logging
    /// is up. Environment overrides are applied afterwards.
    pub fn load(path: &Path) -> SecureTalkResult<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| parse_error(path, e))?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    /// Apply `SECURETALK_MASTER_SECRET` / `SECURETALK_KEY_SALT` overrides
    /// using the given variable lookup.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup(MASTER_SECRET_ENV).filter(|s| !s.is_empty()) {
            self.keys.master_secret = Some(SecretString::from(secret));
        }
        if let Some(salt) = lookup(KEY_SALT_ENV).filter(|s| !s.is_empty()) {
            self.keys.salt = Some(salt);
        }
        self
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
