use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a registered account (the account directory's primary key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl AccountId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        AccountId(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(AccountId)
    }
}

/// Delivery status of a stored message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Stored, not yet opened by the recipient
    #[default]
    Sent,
    /// Opened by the recipient
    Read,
}

impl MessageStatus {
    /// Status only ever moves forward: `Sent → Read`. Re-applying the
    /// current status is allowed.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Sent, _) | (MessageStatus::Read, MessageStatus::Read)
        )
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Sent => f.write_str("SENT"),
            MessageStatus::Read => f.write_str("READ"),
        }
    }
}

/// Current Unix time in seconds.
pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_parses_and_displays() {
        let id: AccountId = " 42 ".parse().unwrap();
        assert_eq!(id, AccountId(42));
        assert_eq!(id.to_string(), "42");
        assert!("alice".parse::<AccountId>().is_err());
    }

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(MessageStatus::Sent.can_transition_to(MessageStatus::Read));
        assert!(MessageStatus::Sent.can_transition_to(MessageStatus::Sent));
        assert!(MessageStatus::Read.can_transition_to(MessageStatus::Read));
        assert!(!MessageStatus::Read.can_transition_to(MessageStatus::Sent));
    }

    #[test]
    fn status_serializes_uppercase() {
        #[derive(Serialize, Deserialize)]
        struct Row {
            status: MessageStatus,
        }
        let toml_str = toml::to_string(&Row { status: MessageStatus::Read }).unwrap();
        assert!(toml_str.contains("\"READ\""));
        let row: Row = toml::from_str("status = \"SENT\"").unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
    }
}
