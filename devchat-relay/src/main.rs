//! `DevChat` Relay Server -- realtime project chat with an AI participant.
//!
//! An axum WebSocket server that relays `project-message` events between
//! clients of the same project and forwards `@ai` prompts to Gemini.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:3001
//! GOOGLE_AI_KEY=... cargo run --bin devchat-relay
//!
//! # Run on custom address
//! cargo run --bin devchat-relay -- --bind 127.0.0.1:8080
//!
//! # Or just the port, via environment variable
//! PORT=4000 cargo run --bin devchat-relay
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use devchat_relay::ai::AiClient;
use devchat_relay::config::{RelayCliArgs, RelayConfig};
use devchat_relay::relay::{self, RelayState};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    // Pick up GOOGLE_AI_KEY and friends from a local .env, if any.
    let _ = dotenvy::dotenv();

    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    if config.ai.api_key.is_none() {
        tracing::warn!("GOOGLE_AI_KEY is not set; AI replies will report an error");
    }
    tracing::info!(addr = %config.bind_addr, ai = ?config.ai, "starting devchat relay server");

    let ai = AiClient::new(config.ai.clone());
    let state = Arc::new(RelayState::with_config(&config, ai));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}

/// Initializes tracing to stderr, or to `file_path` through a non-blocking
/// writer. The returned guard must live until shutdown.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((dir, file_name)) = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)))
    else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
