//! `tourgen` -- diagnostics for the virtual tour video service.
//!
//! Submits render jobs, polls them, finds their videos on the media host,
//! and inspects the CI runs that produce them. Configuration comes from
//! the environment (see `config.rs`); a `.env` file is honoured.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use tourgen_cli::args::Cli;
use tourgen_cli::commands::{self, Context};
use tourgen_cli::config::Config;
use tourgen_cli::exit::Exit;
use tourgen_cli::logging::{self, LogFormat};
use tourgen_cli::output::Output;

/// How long a command may keep running after Ctrl-C.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(cli.log_format.unwrap_or(LogFormat::Text));
            tracing::error!(error = %e, "Invalid configuration");
            eprintln!("error: {e}");
            return Exit::Error.into();
        }
    };
    logging::init(cli.log_format.unwrap_or(config.log_format));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let ctx = Context {
        config,
        out: Output::new(cli.json),
        cancel,
    };

    // Cancellation-aware commands (watch, run) report their own outcome;
    // anything still running after the grace period is abandoned.
    let result = tokio::select! {
        result = commands::run(cli.command, &ctx) => result,
        _ = async {
            ctx.cancel.cancelled().await;
            tokio::time::sleep(CANCEL_GRACE).await;
        } => Ok(Exit::Cancelled),
    };

    match result {
        Ok(exit) => exit.into(),
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("error: {e:#}");
            Exit::Error.into()
        }
    }
}
