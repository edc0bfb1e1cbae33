use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;
use conductor_core::config::LoggingConfig;
use conductor_core::error::ErrorCode;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod progress;
mod prompt;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            i32::from(ErrorCode::GeneralError.as_u16())
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> anyhow::Result<i32> {
    let args = cli::Args::parse();
    let cfg = commands::load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(anyhow::Error::msg)?;
    commands::dispatch(args, cfg).await
}

/// Console and file layers are both optional; at least one must be on when
/// logging is enabled.
fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(&logging.level).map_err(|e| e.to_string())?,
    };

    let file_writer = if logging.file {
        Some(open_log_file(logging)?)
    } else {
        None
    };
    if !logging.console && file_writer.is_none() {
        return Err("logging enabled but both console and file output are off".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });
    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// One file per process under `logging.directory`, or the temp dir.
fn open_log_file(logging: &LoggingConfig) -> Result<NonBlocking, String> {
    let dir = logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("conductor"));
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("cannot create log directory {}: {e}", dir.display()))?;

    let appender =
        tracing_appender::rolling::never(&dir, format!("conductor.{}.log", std::process::id()));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    // Flushes on drop, so it must live until exit.
    let _ = LOG_GUARD.set(guard);
    Ok(writer)
}
