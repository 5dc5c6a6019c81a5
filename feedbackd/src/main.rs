use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use feedbackd::{logging, service, DaemonConfig, LoggingMode};
use tokio::io::BufReader;

/// Feedback event daemon speaking JSON lines on stdin/stdout
#[derive(Parser, Debug)]
#[command(name = "feedbackd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (default: <config dir>/feedbackd/config.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// silent, development or debug (also: FEEDBACKD_LOG_MODE)
    #[arg(long, value_name = "MODE")]
    log_mode: Option<LoggingMode>,
}

fn load_config(path: Option<PathBuf>) -> Result<DaemonConfig> {
    if let Some(path) = path {
        return DaemonConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display()));
    }

    match DaemonConfig::default_path().filter(|path| path.exists()) {
        Some(path) => DaemonConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            tracing::info!("No configuration file, using the built-in event table");
            Ok(DaemonConfig::builtin())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.log_mode {
        Some(mode) => logging::init_logging(mode)?,
        None => logging::init_logging_from_env()?,
    }

    let config = load_config(args.config)?;
    let services = Arc::new(service::build_services(&config)?);

    tracing::info!("feedbackd {} starting", env!("CARGO_PKG_VERSION"));
    service::run(
        services,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        },
    )
    .await?;

    Ok(())
}
