// Alert Sink - latest qualifying snapshot per ticker
// Overwrite on every qualification, no eviction, no dedup of alerts

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::core::types::{format_thousands, Ticker};

/// Most recent qualifying snapshot for one ticker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GainerRecord {
    /// Close of the qualifying bar
    pub price: f64,
    pub pct_change: f64,
    /// Cumulative volume at the time of qualification
    pub volume: u64,
    pub qualified_at: DateTime<Utc>,
    /// Times this ticker has qualified since stream start
    pub hits: u64,
}

/// Notification emitted on each qualification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GainerAlert {
    pub alert_id: Uuid,
    pub ticker: Ticker,
    pub price: f64,
    pub pct_change: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

impl GainerAlert {
    pub fn new(ticker: &str, price: f64, pct_change: f64, volume: u64) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            price,
            pct_change,
            volume,
            timestamp: Utc::now(),
        }
    }
}

/// Price is printed as the raw close (`107.0`, `3.4567`), not rounded
impl fmt::Display for GainerAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ALERT: {} is up {:.2}% | Price: ${:?} | Volume: {}",
            self.ticker,
            self.pct_change,
            self.price,
            format_thousands(self.volume)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertSink {
    gainers: HashMap<Ticker, GainerRecord>,
}

impl AlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the alert's snapshot, replacing any previous record for the ticker.
    /// Returns the stored record.
    pub fn record(&mut self, alert: &GainerAlert) -> &GainerRecord {
        let hits = self.gainers.get(&alert.ticker).map(|r| r.hits).unwrap_or(0) + 1;
        let record = GainerRecord {
            price: alert.price,
            pct_change: alert.pct_change,
            volume: alert.volume,
            qualified_at: alert.timestamp,
            hits,
        };
        self.gainers.insert(alert.ticker.clone(), record);
        &self.gainers[&alert.ticker]
    }

    pub fn get(&self, ticker: &str) -> Option<&GainerRecord> {
        self.gainers.get(ticker)
    }

    pub fn len(&self) -> usize {
        self.gainers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gainers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ticker, &GainerRecord)> {
        self.gainers.iter()
    }

    /// Up to `n` gainers by percent change, largest first; ties broken by ticker
    pub fn top_gainers(&self, n: usize) -> Vec<(Ticker, GainerRecord)> {
        let mut ranked: Vec<(&Ticker, &GainerRecord)> = self.gainers.iter().collect();
        ranked.sort_by(|a, b| {
            OrderedFloat(b.1.pct_change)
                .cmp(&OrderedFloat(a.1.pct_change))
                .then_with(|| a.0.cmp(b.0))
        });
        ranked
            .into_iter()
            .take(n)
            .map(|(t, r)| (t.clone(), r.clone()))
            .collect()
    }
}
