//! Market-level enumerations shared across exchange integrations

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Book Side
// ============================================================================

/// Side of the order book a level or trade belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
    /// Absent or unrecognised on the wire
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
            Side::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Connection state for an exchange stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Attempting to connect
    Connecting,
    /// Connected and receiving data
    Connected,
    /// Disconnected, will attempt reconnect
    Disconnected,
    /// Connection failed, not retrying
    Failed,
}
