//! settle-verify: prove control of an in-game character from the terminal.

mod config;
mod error;
mod run;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use settle_authority::HttpAuthorityClient;
use settle_feed::HttpFeedClient;
use settle_types::SystemClock;
use settle_utils::LogFormat;
use settle_verification::VerificationController;

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(
    name = "settle-verify",
    about = "Verify control of an in-game character through the public chat feed"
)]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "SETTLE_CONFIG")]
    config: Option<PathBuf>,

    /// URL of the public chat feed.
    #[arg(long, env = "SETTLE_FEED_URL")]
    feed_url: Option<String>,

    /// Base URL of the verification authority.
    #[arg(long, env = "SETTLE_AUTHORITY_URL")]
    authority_url: Option<String>,

    /// Bearer token for the verification authority.
    #[arg(long, env = "SETTLE_AUTHORITY_API_KEY", hide_env_values = true)]
    authority_api_key: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "SETTLE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "SETTLE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Request a code and wait until it is seen in chat.
    Verify {
        /// Character name the code must be posted as.
        #[arg(long)]
        username: String,

        /// Identifier of the character in the calling system.
        #[arg(long)]
        entity_id: String,

        /// Resume polling automatically when it backs off.
        #[arg(long)]
        retry_polling: bool,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Print,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        if let Some(feed_url) = &self.feed_url {
            config.feed_url = feed_url.clone();
        }
        if let Some(authority_url) = &self.authority_url {
            config.authority_url = authority_url.clone();
        }
        if let Some(api_key) = &self.authority_api_key {
            config.authority_api_key = Some(api_key.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

fn build_controller(config: &DaemonConfig) -> anyhow::Result<VerificationController> {
    let feed = HttpFeedClient::with_timeout(&config.feed_url, config.request_timeout());
    let mut authority =
        HttpAuthorityClient::with_timeout(&config.authority_url, config.request_timeout());
    if let Some(api_key) = &config.authority_api_key {
        authority = authority.with_api_key(api_key);
    }

    let controller = VerificationController::new(
        Arc::new(feed),
        Arc::new(authority),
        Arc::new(SystemClock),
        config.verification.clone(),
    )?;
    Ok(controller)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    settle_utils::init_logging(config.log_format, &config.log_level);

    match cli.command {
        Command::Config {
            action: ConfigAction::Print,
        } => {
            print!("{}", config.redacted().to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify {
            username,
            entity_id,
            retry_polling,
        } => {
            tracing::info!(
                feed_url = %config.feed_url,
                authority_url = %config.authority_url,
                %username,
                "starting verification"
            );
            let controller = build_controller(&config)?;

            let outcome = run::drive(
                &controller,
                &username,
                &entity_id,
                retry_polling,
                shutdown::interrupted(),
            )
            .await;

            tracing::info!(?outcome, "settle-verify exiting");
            Ok(outcome.exit_code())
        }
    }
}
