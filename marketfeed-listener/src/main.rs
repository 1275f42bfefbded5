//! Gemini Market Data Listener
//!
//! Subscribes to Gemini's market data stream for each configured
//! instrument and logs every decoded message to the console.

mod consumer;

use marketfeed_gemini::{GeminiWebSocket, GeminiWebSocketConfig, StopReason};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,marketfeed_listener=debug")),
        )
        .init();

    let config = GeminiWebSocketConfig::from_env()?;
    info!(
        "Connecting to Gemini: {} (heartbeat={}, auto_reconnect={})",
        config.instruments.join(", "),
        config.heartbeat,
        config.auto_reconnect
    );

    let (websocket, update_rx) = GeminiWebSocket::new(config);
    let consumer = tokio::spawn(consumer::log_updates(update_rx));

    let cancel = CancellationToken::new();
    let handles = websocket.start(cancel.clone())?;

    // Cancel all feeds on Ctrl-C
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    for handle in handles {
        match handle.await {
            Ok(summary) => match &summary.stop {
                StopReason::Cancelled => info!(
                    "Feed {} stopped: {} connection(s), {} message(s), {} decode failure(s), {} sequence anomalies",
                    summary.instrument,
                    summary.connections,
                    summary.messages,
                    summary.decode_failures,
                    summary.sequence_anomalies
                ),
                StopReason::Failed(e) => warn!(
                    "Feed {} gave up after {} message(s): {}",
                    summary.instrument, summary.messages, e
                ),
            },
            Err(e) => error!("Feed task panicked: {}", e),
        }
    }

    // Dropping the client closes the channel and ends the consumer
    drop(websocket);
    let stats = consumer.await?;
    info!(
        "Processed {} initial state(s), {} update(s), {} event(s)",
        stats.initial_states, stats.updates, stats.events
    );

    Ok(())
}
