//! Reconnect policies
//!
//! The connection loop never decides on its own whether to retry. Every
//! connect or receive failure is handed to a [`ReconnectPolicy`], which
//! answers with a delay or tells the loop to stop.

use std::time::Duration;

use marketfeed_core::FeedError;

/// Reconnect delay base
pub const RECONNECT_DELAY_BASE: Duration = Duration::from_secs(1);

/// Upper bound for a single reconnect delay
pub const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(60);

/// Max reconnect attempts
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// What the connection loop should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Sleep for the given delay, then reconnect
    Retry(Duration),
    /// Give up on this instrument
    Stop,
}

/// Strategy deciding how a feed reacts to transport failures
pub trait ReconnectPolicy: Send {
    /// Called after each failed connect or dropped connection.
    fn on_failure(&mut self, error: &FeedError) -> FailureAction;

    /// Called once a connection is established and the initial state read.
    fn on_connected(&mut self);
}

/// Doubling delay: `base * 2^(attempt - 1)`, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    /// `None` retries forever
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base,
            max_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Consecutive failures since the last successful connection
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            RECONNECT_DELAY_BASE,
            RECONNECT_DELAY_MAX,
            Some(MAX_RECONNECT_ATTEMPTS),
        )
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn on_failure(&mut self, error: &FeedError) -> FailureAction {
        if !error.is_transient() {
            return FailureAction::Stop;
        }

        self.attempts = self.attempts.saturating_add(1);
        if let Some(max) = self.max_attempts {
            if self.attempts > max {
                return FailureAction::Stop;
            }
        }

        FailureAction::Retry(self.delay_for(self.attempts))
    }

    fn on_connected(&mut self) {
        self.attempts = 0;
    }
}

/// Never reconnect: the first failure ends the feed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl ReconnectPolicy for NoRetry {
    fn on_failure(&mut self, _error: &FeedError) -> FailureAction {
        FailureAction::Stop
    }

    fn on_connected(&mut self) {}
}
