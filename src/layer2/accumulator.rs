// Ticker Accumulator - running volume per ticker since stream start

use std::collections::HashMap;

use crate::core::types::Ticker;

/// Cumulative traded volume per ticker for the life of the process.
/// Values only grow: successive bar volumes are summed, never replaced.
#[derive(Debug, Clone, Default)]
pub struct TickerAccumulator {
    running_volume: HashMap<Ticker, u64>,
}

impl TickerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one bar's volume and return the new cumulative total
    pub fn accumulate(&mut self, ticker: &str, volume: u64) -> u64 {
        if let Some(total) = self.running_volume.get_mut(ticker) {
            *total = total.saturating_add(volume);
            return *total;
        }
        self.running_volume.insert(ticker.to_string(), volume);
        volume
    }

    pub fn volume(&self, ticker: &str) -> u64 {
        self.running_volume.get(ticker).copied().unwrap_or(0)
    }

    pub fn tracked_tickers(&self) -> usize {
        self.running_volume.len()
    }
}
