//! Stateless decoding of raw frames into Gemini message types

use marketfeed_core::{FeedError, FeedResult};

use crate::types::{InitialState, Update};

/// Decode the first frame of a connection.
pub fn decode_initial(bytes: &[u8]) -> FeedResult<InitialState> {
    serde_json::from_slice(bytes)
        .map_err(|e| FeedError::decode(format!("initial state: {}", e)))
}

/// Decode any frame after the first.
pub fn decode_update(bytes: &[u8]) -> FeedResult<Update> {
    serde_json::from_slice(bytes).map_err(|e| FeedError::decode(format!("update: {}", e)))
}
