//! Exchange definitions

use std::fmt;

/// Supported exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    /// Gemini - US spot crypto exchange
    Gemini,
}

impl Exchange {
    /// Get the full display name (used as the log prefix)
    pub fn display_name(&self) -> &'static str {
        match self {
            Exchange::Gemini => "Gemini",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
