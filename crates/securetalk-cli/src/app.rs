//! Wiring: config → stores → services, and the command bodies.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use securetalk_core::config::SecureTalkConfig;
use securetalk_core::AccountId;
use securetalk_crypto::KeyWrapper;
use securetalk_keys::{
    ensure_keys_for_all_accounts, IssuePolicy, JsonKeyStore, KeyCache, StaticDirectory,
};
use securetalk_messaging::{Conversations, JsonMessageStore, MessageCrypto};

pub struct App {
    keys: Arc<JsonKeyStore>,
    directory: Arc<StaticDirectory>,
    conversations: Conversations,
}

impl App {
    /// Open the JSON stores named by `config`.
    pub fn open(config: SecureTalkConfig) -> Result<Self> {
        let wrapper =
            KeyWrapper::from_config(config.keys.master_secret.clone(), config.keys.salt.clone());
        let policy = IssuePolicy::with_lifetime(
            config
                .keys
                .default_key_lifetime_secs
                .map(Duration::from_secs),
        );

        let keys = Arc::new(JsonKeyStore::open(
            &config.storage.keys_path(),
            wrapper,
            policy,
        )?);
        let directory = Arc::new(StaticDirectory::load(&config.storage.accounts_path())?);
        let messages = Arc::new(JsonMessageStore::open(&config.storage.messages_path())?);

        let crypto = MessageCrypto::new(
            keys.clone(),
            directory.clone(),
            KeyCache::new(Duration::from_secs(config.keys.cache_ttl_secs)),
        );

        Ok(Self {
            keys,
            directory,
            conversations: Conversations::new(Arc::new(crypto), messages),
        })
    }

    pub fn cmd_reconcile(&self, out: &mut impl Write) -> Result<()> {
        let report = ensure_keys_for_all_accounts(self.keys.as_ref(), self.directory.as_ref());

        for account in &report.issued {
            writeln!(out, "issued   {account}")?;
        }
        for account in &report.retired {
            writeln!(out, "retired  {account}")?;
        }
        for (account, error) in &report.failed {
            writeln!(out, "failed   {account}: {error}")?;
        }
        writeln!(
            out,
            "{} accounts: {} issued, {} existing, {} retired, {} failed",
            report.total(),
            report.issued.len(),
            report.existing,
            report.retired.len(),
            report.failed.len()
        )?;
        if !report.is_clean() {
            anyhow::bail!("{} accounts could not be reconciled", report.failed.len());
        }
        Ok(())
    }

    pub fn cmd_send(
        &self,
        from: AccountId,
        to: AccountId,
        text: &str,
        out: &mut impl Write,
    ) -> Result<()> {
        let message = self
            .conversations
            .send(from, to, text)
            .with_context(|| format!("sending message from {from} to {to}"))?;
        writeln!(out, "{}", message.id)?;
        Ok(())
    }

    pub fn cmd_read(&self, id: Uuid, viewer: AccountId, out: &mut impl Write) -> Result<()> {
        let outcome = self.conversations.read(id, viewer)?;
        writeln!(out, "{}", outcome.display_text())?;
        Ok(())
    }

    pub fn cmd_conversation(
        &self,
        viewer: AccountId,
        partner: AccountId,
        out: &mut impl Write,
    ) -> Result<()> {
        let entries = self.conversations.open_conversation(viewer, partner)?;
        if entries.is_empty() {
            writeln!(out, "no messages between {viewer} and {partner}")?;
            return Ok(());
        }
        for entry in entries {
            writeln!(
                out,
                "[{}] {} -> {} ({}): {}",
                entry.created_at,
                entry.sender_id,
                entry.recipient_id,
                entry.status,
                entry.content.display_text()
            )?;
        }
        Ok(())
    }

    pub fn cmd_partners(&self, viewer: AccountId, out: &mut impl Write) -> Result<()> {
        for partner in self.conversations.partners(viewer)? {
            match self.directory.find(partner) {
                Some(record) => writeln!(out, "{partner}\t{}", record.username)?,
                None => writeln!(out, "{partner}")?,
            }
        }
        Ok(())
    }

    pub fn cmd_conversations(&self, viewer: AccountId, out: &mut impl Write) -> Result<()> {
        let summaries = self.conversations.summaries(viewer)?;
        if summaries.is_empty() {
            writeln!(out, "no conversations for {viewer}")?;
            return Ok(());
        }
        for summary in summaries {
            let name = self
                .directory
                .find(summary.partner)
                .map_or("", |record| record.username.as_str());
            let last = summary
                .last
                .as_ref()
                .map_or("", |entry| entry.content.display_text());
            writeln!(
                out,
                "{}\t{}\t[{}] {} unread: {}",
                summary.partner, name, summary.last_activity, summary.unread, last
            )?;
        }
        Ok(())
    }

    pub fn cmd_deactivate(&self, account: AccountId, out: &mut impl Write) -> Result<()> {
        self.conversations
            .crypto()
            .revoke_key(account)
            .with_context(|| format!("deactivating key for account {account}"))?;
        writeln!(out, "deactivated key for account {account}")?;
        Ok(())
    }
}

// ── `securetalk config show` ───────────────────────────────────────────────────

pub fn cmd_config_show(
    config: &SecureTalkConfig,
    config_path: &Path,
    out: &mut impl Write,
) -> Result<()> {
    if config_path.exists() {
        writeln!(out, "# Configuration from: {}", config_path.display())?;
    } else {
        writeln!(
            out,
            "# Configuration: defaults (no file at {})",
            config_path.display()
        )?;
    }
    writeln!(out)?;
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    write!(out, "{rendered}")?;
    Ok(())
}
