// Scanner - startup orchestration
// resolve trading day -> fetch reference closes -> connect -> stream pipeline

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::trading_day::previous_trading_day_from_now;
use crate::core::types::StreamTermination;
use crate::layer1::rest_client::{PolygonRestClient, RestClientError, RestClientStats};
use crate::layer1::websocket::{StreamClient, StreamError, WebSocketStats};
use crate::layer2::metrics::SessionMetrics;
use crate::layer2::parser::ParserStats;
use crate::layer2::pipeline::{PipelineState, PipelineStats, StreamPipeline};
use crate::layer2::reference_store::ReferencePriceStore;

/// Upper bound on the reconnect backoff
pub const MAX_RECONNECT_DELAY_SECS: u64 = 60;

pub type BarStream = BoxStream<'static, Result<String, StreamError>>;

// ============================================================================
// Seams
// ============================================================================

/// Provider of previous-session closing prices
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_closes(&self, date: &str) -> Result<Vec<(String, f64)>, RestClientError>;

    /// Request counters, when the source keeps any
    fn stats(&self) -> Option<RestClientStats> {
        None
    }
}

/// Provider of live bar messages
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Open an authenticated, subscribed message stream
    async fn connect(&self) -> Result<BarStream, StreamError>;

    /// Transport counters, when the source keeps any
    fn stats(&self) -> Option<WebSocketStats> {
        None
    }
}

#[async_trait]
impl ReferenceSource for PolygonRestClient {
    async fn fetch_closes(&self, date: &str) -> Result<Vec<(String, f64)>, RestClientError> {
        self.previous_closes(date).await
    }

    fn stats(&self) -> Option<RestClientStats> {
        Some(self.get_stats())
    }
}

#[async_trait]
impl BarSource for StreamClient {
    async fn connect(&self) -> Result<BarStream, StreamError> {
        let connection = StreamClient::connect(self).await?;
        Ok(connection.into_stream().boxed())
    }

    fn stats(&self) -> Option<WebSocketStats> {
        Some(self.get_stats())
    }
}

// ============================================================================
// Errors / Outcome
// ============================================================================

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("failed to fetch reference prices for {date}: {source}")]
    ReferenceFetch {
        date: String,
        #[source]
        source: RestClientError,
    },
    #[error("no reference prices available for {date}")]
    EmptyReferenceData { date: String },
    #[error("failed to connect to the bar stream: {0}")]
    StreamConnect(#[source] StreamError),
}

/// Result of a run that got past startup
#[derive(Debug)]
pub struct ScannerOutcome {
    /// Trading day the reference closes belong to
    pub date: String,
    pub termination: StreamTermination,
    pub reconnects: u32,
    pub state: PipelineState,
    pub stats: PipelineStats,
    pub parser_stats: ParserStats,
    pub metrics: SessionMetrics,
}

impl ScannerOutcome {
    /// Closed by the server or stopped by the operator
    pub fn is_clean(&self) -> bool {
        !matches!(self.termination, StreamTermination::Failed(_))
    }
}

enum Reconnect {
    Connected(BarStream),
    GaveUp,
    Stopped,
}

/// `min(2^attempt, 60)` seconds
pub fn reconnect_delay(attempt: u32) -> Duration {
    let secs = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs.min(MAX_RECONNECT_DELAY_SECS))
}

// ============================================================================
// Scanner
// ============================================================================

pub struct Scanner<R, B> {
    references: R,
    bars: B,
    max_reconnect_attempts: u32,
    top_gainers_report: usize,
}

impl<R: ReferenceSource, B: BarSource> Scanner<R, B> {
    pub fn new(references: R, bars: B) -> Self {
        Self {
            references,
            bars,
            max_reconnect_attempts: 0,
            top_gainers_report: 10,
        }
    }

    /// Reconnect after a failed stream up to `attempts` times (0 disables)
    pub fn with_reconnect(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_top_gainers_report(mut self, n: usize) -> Self {
        self.top_gainers_report = n;
        self
    }

    /// Fetch and store the closes for `date`. An empty result is fatal.
    pub async fn load_references(&self, date: &str) -> Result<ReferencePriceStore, ScannerError> {
        info!(date = date, "Fetching previous closing prices");

        let closes = self
            .references
            .fetch_closes(date)
            .await
            .map_err(|source| ScannerError::ReferenceFetch { date: date.to_string(), source })?;

        let store = ReferencePriceStore::from_closes(date, closes);
        if store.is_empty() {
            return Err(ScannerError::EmptyReferenceData { date: date.to_string() });
        }
        Ok(store)
    }

    /// Full run against the previous trading day, stopping on Ctrl-C
    pub async fn run(&self) -> Result<ScannerOutcome, ScannerError> {
        let date = previous_trading_day_from_now();
        self.run_for_date(&date, ctrl_c()).await
    }

    /// Full run against an explicit reference date and stop signal
    pub async fn run_for_date<F>(&self, date: &str, shutdown: F) -> Result<ScannerOutcome, ScannerError>
    where
        F: Future<Output = ()>,
    {
        let store = self.load_references(date).await?;
        let mut stream = self.bars.connect().await.map_err(ScannerError::StreamConnect)?;

        futures::pin_mut!(shutdown);
        let mut pipeline = StreamPipeline::new(store);
        let mut attempt = 0u32;

        let termination = loop {
            let termination = pipeline.run_until(stream, shutdown.as_mut()).await;
            if !matches!(termination, StreamTermination::Failed(_)) {
                break termination;
            }

            match self.reconnect(&mut attempt, shutdown.as_mut()).await {
                Reconnect::Connected(next) => stream = next,
                Reconnect::GaveUp => break termination,
                Reconnect::Stopped => break StreamTermination::Stopped,
            }
        };

        info!(termination = %termination, reconnects = attempt, "Streaming finished");

        let stats = pipeline.stats().clone();
        let parser_stats = pipeline.parser_stats().clone();
        let state = pipeline.into_state();
        let metrics = SessionMetrics::from_stats(
            self.references.stats(),
            self.bars.stats(),
            Some(parser_stats.clone()),
            stats.clone(),
            state.references().len(),
            state.volumes.tracked_tickers(),
            state.gainers.top_gainers(self.top_gainers_report),
        );

        Ok(ScannerOutcome {
            date: date.to_string(),
            termination,
            reconnects: attempt,
            state,
            stats,
            parser_stats,
            metrics,
        })
    }

    async fn reconnect<F>(&self, attempt: &mut u32, mut shutdown: std::pin::Pin<&mut F>) -> Reconnect
    where
        F: Future<Output = ()>,
    {
        while *attempt < self.max_reconnect_attempts {
            *attempt += 1;
            let delay = reconnect_delay(*attempt);
            warn!(attempt = *attempt, max = self.max_reconnect_attempts, delay_secs = delay.as_secs(), "Reconnecting to stream");

            tokio::select! {
                _ = shutdown.as_mut() => return Reconnect::Stopped,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.bars.connect().await {
                Ok(stream) => return Reconnect::Connected(stream),
                Err(e) => warn!(attempt = *attempt, error = %e, "Reconnect failed"),
            }
        }
        Reconnect::GaveUp
    }
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed the run
/// simply continues until the stream ends.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubReferences(Result<Vec<(String, f64)>, u16>);

    #[async_trait]
    impl ReferenceSource for StubReferences {
        async fn fetch_closes(&self, _date: &str) -> Result<Vec<(String, f64)>, RestClientError> {
            match &self.0 {
                Ok(closes) => Ok(closes.clone()),
                Err(status) => Err(RestClientError::Status { status: *status, body: "denied".into() }),
            }
        }
    }

    /// Hands out one scripted session per connect call
    #[derive(Default)]
    struct StubBars {
        sessions: Mutex<VecDeque<Result<Vec<Result<String, StreamError>>, StreamError>>>,
        connects: AtomicUsize,
    }

    impl StubBars {
        fn with(sessions: Vec<Result<Vec<Result<String, StreamError>>, StreamError>>) -> Self {
            Self { sessions: Mutex::new(sessions.into()), connects: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl BarSource for StubBars {
        async fn connect(&self) -> Result<BarStream, StreamError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.sessions.lock().pop_front() {
                Some(Ok(messages)) => Ok(futures::stream::iter(messages).boxed()),
                Some(Err(e)) => Err(e),
                None => Err(StreamError::Connect("no more sessions".into())),
            }
        }
    }

    fn closes(entries: &[(&str, f64)]) -> StubReferences {
        StubReferences(Ok(entries.iter().map(|(t, p)| (t.to_string(), *p)).collect()))
    }

    fn am(ticker: &str, close: f64, volume: u64) -> Result<String, StreamError> {
        Ok(format!(r#"[{{"ev":"AM","sym":"{}","c":{},"v":{}}}]"#, ticker, close, volume))
    }

    #[test]
    fn test_reconnect_delay() {
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(5), Duration::from_secs(32));
        assert_eq!(reconnect_delay(6), Duration::from_secs(60));
        assert_eq!(reconnect_delay(200), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_empty_reference_never_connects() {
        let scanner = Scanner::new(closes(&[]), StubBars::default());
        let result = scanner.run_for_date("2024-06-07", futures::future::pending()).await;

        assert!(matches!(result, Err(ScannerError::EmptyReferenceData { ref date }) if date == "2024-06-07"));
        assert_eq!(scanner.bars.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_reference_never_connects() {
        let scanner = Scanner::new(StubReferences(Err(403)), StubBars::default());
        let result = scanner.run_for_date("2024-06-07", futures::future::pending()).await;

        assert!(matches!(
            result,
            Err(ScannerError::ReferenceFetch { source: RestClientError::Status { status: 403, .. }, .. })
        ));
        assert_eq!(scanner.bars.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let bars = StubBars::with(vec![Err(StreamError::Connect("refused".into()))]);
        let scanner = Scanner::new(closes(&[("AAPL", 100.0)]), bars);
        let result = scanner.run_for_date("2024-06-07", futures::future::pending()).await;
        assert!(matches!(result, Err(ScannerError::StreamConnect(_))));
    }

    #[tokio::test]
    async fn test_clean_run() {
        let bars = StubBars::with(vec![Ok(vec![am("AAPL", 106.0, 1_500_000), am("AAPL", 107.0, 600_000)])]);
        let scanner = Scanner::new(closes(&[("AAPL", 100.0)]), bars);
        let outcome = scanner.run_for_date("2024-06-07", futures::future::pending()).await.unwrap();

        assert_eq!(outcome.termination, StreamTermination::Closed);
        assert!(outcome.is_clean());
        assert_eq!(outcome.stats.alerts_emitted, 1);
        assert_eq!(outcome.state.gainers.get("AAPL").unwrap().volume, 2_100_000);
        assert_eq!(outcome.metrics.top_gainers.len(), 1);
    }

    #[tokio::test]
    async fn test_no_reconnect_by_default() {
        let bars = StubBars::with(vec![
            Ok(vec![Err(StreamError::Transport("reset".into()))]),
            Ok(vec![]),
        ]);
        let scanner = Scanner::new(closes(&[("AAPL", 100.0)]), bars);
        let outcome = scanner.run_for_date("2024-06-07", futures::future::pending()).await.unwrap();

        assert!(matches!(outcome.termination, StreamTermination::Failed(_)));
        assert!(!outcome.is_clean());
        assert_eq!(scanner.bars.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_keeps_state() {
        let bars = StubBars::with(vec![
            Ok(vec![am("AAPL", 106.0, 1_500_000), Err(StreamError::Transport("reset".into()))]),
            Err(StreamError::Connect("refused".into())),
            Ok(vec![am("AAPL", 107.0, 600_000)]),
        ]);
        let scanner = Scanner::new(closes(&[("AAPL", 100.0)]), bars).with_reconnect(3);
        let outcome = scanner.run_for_date("2024-06-07", futures::future::pending()).await.unwrap();

        assert_eq!(outcome.termination, StreamTermination::Closed);
        assert_eq!(outcome.reconnects, 2);
        assert_eq!(outcome.stats.alerts_emitted, 1);
        assert_eq!(outcome.state.volumes.volume("AAPL"), 2_100_000);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let bars = StubBars::with(vec![Ok(vec![am("AAPL", 106.0, 1_500_000)])]);
        let scanner = Scanner::new(closes(&[("AAPL", 100.0)]), bars);
        let outcome = scanner.run_for_date("2024-06-07", futures::future::ready(())).await.unwrap();
        assert_eq!(outcome.termination, StreamTermination::Stopped);
    }
}
