//! Core types for the Gemini market data listener
//!
//! This crate defines the pieces shared by exchange integrations and the
//! listener binary: the error type, exchange identifiers and the small
//! market enumerations that appear on every wire format.

pub mod error;
pub mod exchange;
pub mod market;

pub use error::{FeedError, FeedResult};
pub use exchange::Exchange;
pub use market::{ConnectionState, Side};
