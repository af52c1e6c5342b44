//! linechatd - line-oriented chat daemon.
//!
//! Usage: `linechatd [config.toml]`. The config path may also come from
//! `CFG_FILE`; individual settings can be overridden from the environment.

use chrono::Utc;
use linechat::ChatServer;
use linechat::config::{self, Config};
use linechat::transcript::{FileSink, Transcript, transcript_path};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let (config_path, explicit) = match std::env::args().nth(1) {
        Some(path) => (path, true),
        None => match std::env::var("CFG_FILE") {
            Ok(path) => (path, true),
            Err(_) => (config::DEFAULT_CONFIG_PATH.to_string(), false),
        },
    };
    let mut config = Config::load_or_default(&config_path, explicit)?;
    config::apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;

    linechat::telemetry::init(&config.log);
    info!(path = %config_path, "Starting chat server");

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }

    // Transcript file, one per run
    let path = transcript_path(&config.transcript.dir(), Utc::now());
    let sink = FileSink::create(&path).map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to create chat transcript");
        e
    })?;
    info!(path = %path.display(), "Chat transcript opened");
    let transcript = Transcript::new(Arc::new(sink));

    linechat::metrics::init();

    let server = ChatServer::bind(&config, transcript).await?.start()?;

    wait_for_shutdown().await;
    info!(users = server.matrix.registry().len(), "Chat server exiting");
    server.shutdown();
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => error!(error = %e, "Unable to install SIGTERM handler"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Unable to listen for shutdown signal");
    }
}
