// Stream Pipeline - per-event gainer processing
// message -> parser -> reference lookup -> accumulator -> evaluator -> alert sink

use futures::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use tracing::{debug, error, info, warn};

use crate::core::types::{MinuteBar, StreamTermination};
use crate::layer1::websocket::StreamError;
use crate::layer2::accumulator::TickerAccumulator;
use crate::layer2::alert_sink::{AlertSink, GainerAlert};
use crate::layer2::parser::{MessageParser, ParsedMessage, ParsedStatus, ParserStats};
use crate::layer2::reference_store::ReferencePriceStore;
use crate::layer3::gainer;

// ============================================================================
// State
// ============================================================================

/// All per-ticker state for one run. Owned by the pipeline and mutated only
/// through `&mut self`, so nothing here is shared or locked. Reference prices
/// are read-only once the state exists.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    references: ReferencePriceStore,
    pub volumes: TickerAccumulator,
    pub gainers: AlertSink,
}

impl PipelineState {
    pub fn new(references: ReferencePriceStore) -> Self {
        Self {
            references,
            volumes: TickerAccumulator::new(),
            gainers: AlertSink::new(),
        }
    }

    pub fn references(&self) -> &ReferencePriceStore {
        &self.references
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub messages_received: u64,
    pub bars_processed: u64,
    pub unknown_ticker_bars: u64,
    pub decode_errors: u64,
    pub status_events: u64,
    pub ignored_events: u64,
    pub alerts_emitted: u64,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline(messages={}, bars={}, unknown={}, decode_errors={}, alerts={})",
            self.messages_received, self.bars_processed, self.unknown_ticker_bars,
            self.decode_errors, self.alerts_emitted
        )
    }
}

// ============================================================================
// StreamPipeline
// ============================================================================

pub struct StreamPipeline {
    state: PipelineState,
    parser: MessageParser,
    stats: PipelineStats,
}

impl StreamPipeline {
    pub fn new(references: ReferencePriceStore) -> Self {
        Self::with_state(PipelineState::new(references))
    }

    pub fn with_state(state: PipelineState) -> Self {
        info!(references = state.references.len(), "Creating stream pipeline");
        Self {
            state,
            parser: MessageParser::new(),
            stats: PipelineStats::default(),
        }
    }

    /// Apply one bar. Bars for tickers without a usable reference price are
    /// skipped entirely: no volume is accumulated for them.
    pub fn process_bar(&mut self, bar: &MinuteBar) -> Option<GainerAlert> {
        let prev_close = match self.state.references.reference_price(&bar.ticker) {
            Some(p) => p,
            None => {
                self.stats.unknown_ticker_bars += 1;
                return None;
            }
        };

        self.stats.bars_processed += 1;
        let cumulative = self.state.volumes.accumulate(&bar.ticker, bar.volume);

        let evaluation = gainer::evaluate(prev_close, bar.close, cumulative)?;
        if !evaluation.qualifies() {
            return None;
        }

        let alert = GainerAlert::new(&bar.ticker, bar.close, evaluation.pct_change, cumulative);
        self.state.gainers.record(&alert);
        self.stats.alerts_emitted += 1;

        info!(
            alert_id = %alert.alert_id,
            ticker = %alert.ticker,
            pct_change = alert.pct_change,
            volume = alert.volume,
            "{}", alert
        );
        Some(alert)
    }

    /// Decode one raw stream message and apply every minute bar in it.
    /// Decode failures are logged and counted, never returned.
    pub fn process_message(&mut self, raw: &str) -> Vec<GainerAlert> {
        self.stats.messages_received += 1;

        let events = match self.parser.parse(raw) {
            Ok(events) => events,
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!(error = %e, "Skipping undecodable message");
                return Vec::new();
            }
        };

        let mut alerts = Vec::new();
        for event in events {
            match event {
                ParsedMessage::MinuteBar(parsed) => {
                    let bar: MinuteBar = parsed.into();
                    if let Some(alert) = self.process_bar(&bar) {
                        alerts.push(alert);
                    }
                }
                ParsedMessage::Status(status) => {
                    self.stats.status_events += 1;
                    log_status(&status);
                }
                ParsedMessage::Ignored(_) => {
                    self.stats.ignored_events += 1;
                }
            }
        }
        alerts
    }

    /// Drive the pipeline until the stream ends or fails
    pub async fn run<S>(&mut self, stream: S) -> StreamTermination
    where
        S: Stream<Item = Result<String, StreamError>>,
    {
        self.run_until(stream, std::future::pending::<()>()).await
    }

    /// Drive the pipeline until the stream ends, fails, or `shutdown` resolves
    pub async fn run_until<S, F>(&mut self, stream: S, shutdown: F) -> StreamTermination
    where
        S: Stream<Item = Result<String, StreamError>>,
        F: Future<Output = ()>,
    {
        futures::pin_mut!(stream);
        futures::pin_mut!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping stream");
                    return StreamTermination::Stopped;
                }
                next = stream.next() => match next {
                    Some(Ok(raw)) => {
                        self.process_message(&raw);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Stream failed");
                        return StreamTermination::Failed(e.to_string());
                    }
                    None => {
                        info!(stats = %self.stats, "Stream closed");
                        return StreamTermination::Closed;
                    }
                }
            }
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn into_state(self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn parser_stats(&self) -> &ParserStats {
        &self.parser.stats
    }
}

fn log_status(status: &ParsedStatus) {
    if status.is_auth_failure() {
        warn!(status = %status.status, message = %status.message, "Stream authentication failed");
    } else {
        debug!(status = %status.status, message = %status.message, "Stream status");
    }
}
