//! Feed configuration
//!
//! Built once at startup and handed to [`crate::GeminiWebSocket`]; nothing
//! here is global.

use std::time::Duration;

use marketfeed_core::{FeedError, FeedResult};

use crate::backoff::{
    ExponentialBackoff, NoRetry, ReconnectPolicy, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_BASE,
    RECONNECT_DELAY_MAX,
};

/// Gemini v1 market data endpoint; the instrument symbol is appended
pub const GEMINI_WS_URL: &str = "wss://api.gemini.com/v1/marketdata/";

/// Instruments subscribed when none are configured
pub const DEFAULT_INSTRUMENTS: &[&str] = &["BTCUSD"];

/// Configuration for GeminiWebSocket
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeminiWebSocketConfig {
    pub base_url: String,
    pub instruments: Vec<String>,
    /// Ask the exchange to interleave heartbeat frames
    pub heartbeat: bool,
    pub auto_reconnect: bool,
    /// `0` means unlimited
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_base: Duration,
    pub reconnect_delay_max: Duration,
}

impl Default for GeminiWebSocketConfig {
    fn default() -> Self {
        Self {
            base_url: GEMINI_WS_URL.to_string(),
            instruments: DEFAULT_INSTRUMENTS.iter().map(|s| s.to_string()).collect(),
            heartbeat: false,
            auto_reconnect: true,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_base: RECONNECT_DELAY_BASE,
            reconnect_delay_max: RECONNECT_DELAY_MAX,
        }
    }
}

impl GeminiWebSocketConfig {
    /// Load from `GEMINI_*` environment variables, falling back to defaults.
    pub fn from_env() -> FeedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> FeedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("GEMINI_WS_URL") {
            config.base_url = url.trim().to_string();
        }

        if let Some(list) = lookup("GEMINI_INSTRUMENTS") {
            config.instruments = list
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(value) = lookup("GEMINI_HEARTBEAT") {
            config.heartbeat = parse_bool("GEMINI_HEARTBEAT", &value)?;
        }

        if let Some(value) = lookup("GEMINI_AUTO_RECONNECT") {
            config.auto_reconnect = parse_bool("GEMINI_AUTO_RECONNECT", &value)?;
        }

        if let Some(value) = lookup("GEMINI_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = value.trim().parse().map_err(|_| {
                FeedError::config(format!(
                    "GEMINI_MAX_RECONNECT_ATTEMPTS must be a non-negative integer, got '{}'",
                    value
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the feed cannot run with
    pub fn validate(&self) -> FeedResult<()> {
        if !(self.base_url.starts_with("wss://") || self.base_url.starts_with("ws://")) {
            return Err(FeedError::config(format!(
                "base url must use ws:// or wss://, got '{}'",
                self.base_url
            )));
        }
        if self.instruments.is_empty() {
            return Err(FeedError::config("no instruments configured"));
        }
        if let Some(bad) = self
            .instruments
            .iter()
            .find(|s| !s.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(FeedError::config(format!("invalid instrument symbol '{}'", bad)));
        }
        Ok(())
    }

    /// Build the reconnect policy this configuration asks for
    pub fn reconnect_policy(&self) -> Box<dyn ReconnectPolicy> {
        if !self.auto_reconnect {
            return Box::new(NoRetry);
        }

        let max_attempts = match self.max_reconnect_attempts {
            0 => None,
            n => Some(n),
        };
        Box::new(ExponentialBackoff::new(
            self.reconnect_delay_base,
            self.reconnect_delay_max,
            max_attempts,
        ))
    }
}

fn parse_bool(key: &str, value: &str) -> FeedResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FeedError::config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
