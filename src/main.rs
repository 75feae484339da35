mod app;
mod config;
mod error;
mod irc;
mod logging;

use crate::error::SessionError;
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let cfg = config::load_config(&config_path)?;
    if cfg.server.token.is_empty() {
        warn!(
            "no OAuth token configured; set server.token or {}",
            config::TOKEN_ENV
        );
    }
    info!(
        server = %cfg.server.address(),
        channel = %cfg.server.channel,
        nickname = %cfg.server.nickname,
        "starting crabmod"
    );

    let (console_tx, console_rx) = mpsc::unbounded_channel::<String>();
    spawn_console_reader(console_tx);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            ctrl_c.cancel();
        }
    });

    match app::session::run(Arc::new(cfg), console_rx, cancel).await {
        Ok(()) | Err(SessionError::Cancelled) => {
            info!("bye");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "session ended");
            Err(e).context("session ended with an error")
        }
    }
}

/// Read console lines on a plain thread: a blocking stdin read must not hold
/// up runtime shutdown.
fn spawn_console_reader(tx: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}
