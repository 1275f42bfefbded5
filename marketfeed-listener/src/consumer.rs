//! Console consumer for decoded market data

use tokio::sync::mpsc;
use tracing::{info, warn};

use marketfeed_core::{ConnectionState, Exchange};
use marketfeed_gemini::GeminiUpdate;

/// Running totals kept by the console consumer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub initial_states: u64,
    pub updates: u64,
    pub events: u64,
}

/// Log every update until all senders are dropped.
pub async fn log_updates(mut rx: mpsc::Receiver<GeminiUpdate>) -> ConsumerStats {
    let exchange = Exchange::Gemini;
    let mut stats = ConsumerStats::default();

    while let Some(update) = rx.recv().await {
        match update {
            GeminiUpdate::InitialState { instrument, state } => {
                stats.initial_states += 1;
                stats.events += state.events.len() as u64;
                info!("[{}] {} parsed: {:?}", exchange, instrument, state);
            }
            GeminiUpdate::Update { instrument, update } => {
                stats.updates += 1;
                stats.events += update.events.len() as u64;
                info!("[{}] {} parsed: {:?}", exchange, instrument, update);
            }
            GeminiUpdate::ConnectionState {
                instrument,
                state,
                error,
            } => match (state, error) {
                (ConnectionState::Failed, Some(e)) => {
                    warn!("[{}] {} feed failed: {}", exchange, instrument, e)
                }
                (_, Some(e)) => info!("[{}] {} {:?}: {}", exchange, instrument, state, e),
                (_, None) => info!("[{}] {} {:?}", exchange, instrument, state),
            },
        }
    }

    stats
}
