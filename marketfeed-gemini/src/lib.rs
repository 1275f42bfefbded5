//! Gemini integration for the market data listener
//!
//! This crate subscribes to Gemini's public v1 market data stream, one
//! WebSocket per instrument, and decodes the initial order book snapshot
//! and the update frames that follow it. No authentication is required.
//!
//! Configuration comes from `GEMINI_*` environment variables, see
//! [`GeminiWebSocketConfig::from_env`].

pub mod backoff;
pub mod config;
pub mod decode;
pub mod sequence;
pub mod transport;
pub mod types;
pub mod websocket;

pub use backoff::{ExponentialBackoff, FailureAction, NoRetry, ReconnectPolicy};
pub use config::{GeminiWebSocketConfig, GEMINI_WS_URL};
pub use decode::{decode_initial, decode_update};
pub use sequence::{SequenceCheck, SequenceTracker};
pub use transport::{Connection, Connector, TungsteniteConnector};
pub use types::{Event, EventReason, EventType, InitialState, MessageType, Update};
pub use websocket::{
    subscription_url, FeedSummary, GeminiUpdate, GeminiWebSocket, InstrumentFeed, StopReason,
};
