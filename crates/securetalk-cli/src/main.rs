//! securetalk: administration CLI for the encrypted message store
//!
//! Commands:
//!   reconcile                          - issue keys for every account that lacks one
//!   send --from <id> --to <id> <text>  - encrypt and store a message
//!   read <message-id> --as <id>        - decrypt one message for a participant
//!   conversation --as <id> --with <id> - show a conversation, marking it read
//!   partners --as <id>                 - list conversation partners
//!   conversations --as <id>            - list conversations with last message and unread count
//!   deactivate <id>                    - retire an account's key
//!   config show                        - display the effective configuration

mod app;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use securetalk_core::config::SecureTalkConfig;
use securetalk_core::AccountId;

use crate::app::App;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "securetalk",
    version,
    about = "SecureTalk encrypted message store administration",
    long_about = "securetalk: manage per-account message keys and inspect encrypted conversations"
)]
struct Cli {
    /// Path to securetalk.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SECURETALK_CONFIG",
        default_value = "/etc/securetalk/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides [logging] level.
    #[arg(long, env = "SECURETALK_LOG")]
    log: Option<String>,

    /// Log format. Overrides [logging] format.
    #[arg(long, env = "SECURETALK_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ensure every account in the directory has a key
    Reconcile,

    /// Encrypt a message for both participants and store it
    Send {
        #[arg(long)]
        from: AccountId,
        #[arg(long)]
        to: AccountId,
        /// Message text
        text: String,
    },

    /// Decrypt a stored message for one of its participants
    Read {
        id: Uuid,
        #[arg(long = "as")]
        viewer: AccountId,
    },

    /// Show the conversation between two accounts
    Conversation {
        #[arg(long = "as")]
        viewer: AccountId,
        #[arg(long = "with")]
        partner: AccountId,
    },

    /// List the accounts a viewer has exchanged messages with
    Partners {
        #[arg(long = "as")]
        viewer: AccountId,
    },

    /// List a viewer's conversations with the latest message and unread count
    Conversations {
        #[arg(long = "as")]
        viewer: AccountId,
    },

    /// Retire an account's key (material is kept for recovery)
    Deactivate { account: AccountId },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration (secrets omitted)
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SecureTalkConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let level = cli
        .log
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        LogFormat::from_str(&config.logging.format, true).unwrap_or(LogFormat::Text)
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "securetalk starting"
    );
    if !cli.config.exists() {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    if let Commands::Config {
        action: ConfigAction::Show,
    } = cli.command
    {
        return app::cmd_config_show(&config, &cli.config, &mut std::io::stdout());
    }

    // Store access is blocking file I/O; keep it off the async workers.
    tokio::task::spawn_blocking(move || run(cli.command, config))
        .await
        .context("command task panicked")?
}

fn run(command: Commands, config: SecureTalkConfig) -> Result<()> {
    let app = App::open(config)?;
    let mut out = std::io::stdout();

    match command {
        Commands::Reconcile => app.cmd_reconcile(&mut out),
        Commands::Send { from, to, text } => app.cmd_send(from, to, &text, &mut out),
        Commands::Read { id, viewer } => app.cmd_read(id, viewer, &mut out),
        Commands::Conversation { viewer, partner } => {
            app.cmd_conversation(viewer, partner, &mut out)
        }
        Commands::Partners { viewer } => app.cmd_partners(viewer, &mut out),
        Commands::Conversations { viewer } => app.cmd_conversations(viewer, &mut out),
        Commands::Deactivate { account } => app.cmd_deactivate(account, &mut out),
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
