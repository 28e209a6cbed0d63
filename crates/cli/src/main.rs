//! Storefront session CLI - sign in to the platform and manage the stored
//! session from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (prompts for the password on stdin when --password is omitted)
//! storefront-session login -e ada@example.com
//!
//! # Create an account and sign in
//! storefront-session register -e ada@example.com --first-name Ada
//!
//! # Show the stored session without touching the network
//! storefront-session status
//!
//! # Fetch the signed-in customer's profile
//! storefront-session whoami
//!
//! # Force a token refresh / keep refreshing until Ctrl-C
//! storefront-session extend
//! storefront-session keep-alive --interval-secs 300
//!
//! # Sign out
//! storefront-session logout
//! ```
//!
//! Configuration comes from the environment; see
//! [`storefront_session::SessionConfig`].

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storefront_session::{SessionClient, SessionConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "storefront-session")]
#[command(author, version, about = "Storefront customer session tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Password (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Password (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,

        /// Given name
        #[arg(long)]
        first_name: Option<String>,

        /// Family name
        #[arg(long)]
        last_name: Option<String>,

        /// Opt in to marketing email
        #[arg(long)]
        accepts_marketing: bool,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Fetch and print the signed-in customer's profile
    Whoami,
    /// Print the stored session state without contacting the platform
    Status,
    /// Force a token refresh
    Extend,
    /// Keep the session fresh until interrupted
    KeepAlive {
        /// Seconds between refreshes (defaults to `SESSION_EXTEND_INTERVAL_SECS`)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SessionConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Log to stderr so command output on stdout stays clean.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront_session=info,storefront_session_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configuration is needed before tracing so Sentry can be initialized first
    let config = match SessionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry_guard = init_sentry(&config);
    init_tracing();

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &SessionConfig) -> Result<(), CommandError> {
    let client = SessionClient::from_config(config)?;
    let state = client.load();
    tracing::debug!(?state, path = %config.store_path.display(), "Loaded stored session");

    match cli.command {
        Commands::Login { email, password } => {
            commands::account::login(&client, &email, password).await?;
        }
        Commands::Register {
            email,
            password,
            first_name,
            last_name,
            accepts_marketing,
        } => {
            let details = commands::account::NewAccount {
                email,
                password,
                first_name,
                last_name,
                accepts_marketing,
            };
            commands::account::register(&client, details).await?;
        }
        Commands::Logout => commands::account::logout(&client).await?,
        Commands::Whoami => commands::account::whoami(&client).await?,
        Commands::Status => commands::session::status(&client),
        Commands::Extend => commands::session::extend(&client).await?,
        Commands::KeepAlive { interval_secs } => {
            let interval = interval_secs.map_or_else(|| config.extend_interval(), Duration::from_secs);
            commands::session::keep_alive(&client, interval).await?;
        }
    }
    Ok(())
}
