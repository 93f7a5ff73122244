use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use alita_relay::{Config, Gateway};

/// Alita - Telegram relay for a Gemini-backed persona
#[derive(Parser)]
#[command(name = "alita", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to the standard config dir)
    #[arg(short, long, env = "ALITA_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory for transcripts and media
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds to wait after a failed Telegram poll
    #[arg(long, env = "ALITA_POLL_RETRY_SECS", default_value = "3")]
    poll_retry_secs: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,alita_relay=info",
        1 => "info,alita_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "alita relay starting");
    tracing::debug!(?config, "loaded configuration");

    Gateway::new(config)
        .with_poll_retry(Duration::from_secs(cli.poll_retry_secs.max(1)))
        .run()
        .await?;

    Ok(())
}
