// Core Type Definitions for the Momentum Scanner

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange symbol. Unique key across reference prices, running volume and gainers.
pub type Ticker = String;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Why the streaming phase ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StreamTermination {
    /// Server closed the connection or the stream ran dry
    Closed,
    /// Transport fault or abrupt close
    Failed(String),
    /// Operator requested shutdown
    Stopped,
}

impl fmt::Display for StreamTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTermination::Closed => write!(f, "closed"),
            StreamTermination::Failed(reason) => write!(f, "failed: {}", reason),
            StreamTermination::Stopped => write!(f, "stopped"),
        }
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// One per-minute aggregate bar, reduced to what the gainer pipeline consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteBar {
    pub ticker: Ticker,
    pub close: f64,
    pub volume: u64,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

impl MinuteBar {
    pub fn new(ticker: &str, close: f64, volume: u64) -> Self {
        Self {
            ticker: ticker.to_string(),
            close,
            volume,
            start_ms: None,
            end_ms: None,
        }
    }
}

impl fmt::Display for MinuteBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MinuteBar({} close={} volume={})", self.ticker, self.close, self.volume)
    }
}

/// Format an integer with comma thousands separators: 2100000 -> "2,100,000"
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1_000), "1,000");
        assert_eq!(format_thousands(2_100_000), "2,100,000");
        assert_eq!(format_thousands(12_345_678), "12,345,678");
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(StreamTermination::Closed.to_string(), "closed");
        assert_eq!(
            StreamTermination::Failed("reset by peer".into()).to_string(),
            "failed: reset by peer"
        );
    }
}
