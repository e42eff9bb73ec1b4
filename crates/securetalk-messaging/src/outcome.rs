use std::fmt;

/// Why a message could not be shown. Carries no cryptographic detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Authentication tag mismatch: altered data or the wrong key
    Tampered,
    /// Stored fields are not well-formed ciphertext/IV
    Malformed,
    /// No slot exists for this reader, or no key is available
    Unreadable,
}

impl Placeholder {
    /// User-safe text for rendering in place of the message body.
    pub fn text(self) -> &'static str {
        match self {
            Placeholder::Tampered => "[message altered or wrong key]",
            Placeholder::Malformed => "[invalid message format]",
            Placeholder::Unreadable => "[message cannot be decrypted]",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    Plaintext(String),
    Placeholder(Placeholder),
}

impl DecryptOutcome {
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            DecryptOutcome::Plaintext(text) => Some(text),
            DecryptOutcome::Placeholder(_) => None,
        }
    }

    pub fn placeholder(&self) -> Option<Placeholder> {
        match self {
            DecryptOutcome::Placeholder(p) => Some(*p),
            DecryptOutcome::Plaintext(_) => None,
        }
    }

    /// Text to show a reader: the plaintext or the placeholder text.
    pub fn display_text(&self) -> &str {
        match self {
            DecryptOutcome::Plaintext(text) => text,
            DecryptOutcome::Placeholder(p) => p.text(),
        }
    }
}

impl From<Placeholder> for DecryptOutcome {
    fn from(p: Placeholder) -> Self {
        DecryptOutcome::Placeholder(p)
    }
}
