//! Gemini market data wire types
//!
//! These types mirror the JSON frames sent on Gemini's v1 market data
//! stream. Every field is defaulted so a frame missing a field decodes to
//! the zero value instead of failing.

use marketfeed_core::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Envelope type of a market data frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Update,
    Heartbeat,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Kind of an individual event inside a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Change,
    Trade,
    BlockTrade,
    AuctionOpen,
    AuctionIndicative,
    AuctionResult,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Why a `change` event happened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventReason {
    /// Part of the order book snapshot sent on subscribe
    Initial,
    Place,
    Cancel,
    Trade,
    TopOfBook,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One atomic book change or trade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reason: EventReason,
    pub price: Decimal,
    /// Signed quantity change at `price`
    pub delta: Decimal,
    /// Quantity left at `price` after the change
    pub remaining: Decimal,
    pub side: Side,

    /// Trade id (trade events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<u64>,

    /// Traded quantity (trade events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    /// Resting side of the trade (trade events only)
    #[serde(rename = "makerSide", skip_serializing_if = "Option::is_none")]
    pub maker_side: Option<Side>,
}

impl Event {
    pub fn is_trade(&self) -> bool {
        matches!(self.event_type, EventType::Trade | EventType::BlockTrade)
    }
}

/// First frame on a connection: the full book at subscription time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(rename = "eventId")]
    pub event_id: u64,
    pub socket_sequence: u32,
    pub events: Vec<Event>,
}

/// Every later frame: incremental changes and trades
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Update {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(rename = "eventId")]
    pub event_id: u64,
    /// Seconds since epoch
    pub timestamp: u64,
    /// Milliseconds since epoch
    pub timestampms: u64,
    pub socket_sequence: u32,
    pub events: Vec<Event>,
}

impl Update {
    pub fn is_heartbeat(&self) -> bool {
        self.message_type == MessageType::Heartbeat
    }
}
