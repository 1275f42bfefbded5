//! Error types for the market data feed

use thiserror::Error;

/// Feed-wide error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Receive error: {0}")]
    Receive(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,
}

impl FeedError {
    pub fn connect(msg: impl Into<String>) -> Self {
        FeedError::Connect(msg.into())
    }

    pub fn receive(msg: impl Into<String>) -> Self {
        FeedError::Receive(msg.into())
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        FeedError::ConnectionClosed(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        FeedError::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FeedError::Config(msg.into())
    }

    /// Transport-level failures that a fresh connection may cure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::Connect(_) | FeedError::Receive(_) | FeedError::ConnectionClosed(_)
        )
    }
}

/// Result type alias for feed operations
pub type FeedResult<T> = Result<T, FeedError>;
