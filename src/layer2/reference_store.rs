// Reference Price Store - previous session closing price per ticker
// Populated once before streaming, read-only afterwards

use std::collections::HashMap;
use std::fmt;
use tracing::info;

use crate::core::types::Ticker;

#[derive(Debug, Clone, Default)]
pub struct ReferencePriceStore {
    closes: HashMap<Ticker, f64>,
    /// Trading day the closes belong to (YYYY-MM-DD)
    date: Option<String>,
}

impl ReferencePriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The only way to fill a store; duplicates resolve last-wins in iteration order
    pub fn from_closes<I>(date: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (Ticker, f64)>,
    {
        let mut store = Self::new();
        store.populate(date, entries);
        store
    }

    /// Absorb every (ticker, close) entry. Returns the number of distinct tickers held.
    fn populate<I>(&mut self, date: &str, entries: I) -> usize
    where
        I: IntoIterator<Item = (Ticker, f64)>,
    {
        for (ticker, close) in entries {
            self.closes.insert(ticker, close);
        }
        self.date = Some(date.to_string());

        info!(date = date, count = self.closes.len(), "Reference closing prices populated");
        self.closes.len()
    }

    /// Usable reference price: present, finite and strictly positive.
    /// Anything else is "no reference".
    pub fn reference_price(&self, ticker: &str) -> Option<f64> {
        self.closes
            .get(ticker)
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

impl fmt::Display for ReferencePriceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReferencePriceStore(date={}, tickers={})",
            self.date.as_deref().unwrap_or("-"),
            self.closes.len()
        )
    }
}
