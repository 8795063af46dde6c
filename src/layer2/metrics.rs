// Session Metrics - end-of-run report
// Gathers the per-component stats into a single view

use std::fmt;
use tracing::info;

use crate::core::types::{format_thousands, Ticker};
use crate::layer1::rest_client::RestClientStats;
use crate::layer1::websocket::WebSocketStats;
use crate::layer2::alert_sink::GainerRecord;
use crate::layer2::parser::ParserStats;
use crate::layer2::pipeline::PipelineStats;

#[derive(Debug, Clone)]
pub struct SessionMetrics {
    pub rest: Option<RestClientStats>,
    pub ws: Option<WebSocketStats>,
    pub parser: Option<ParserStats>,
    pub pipeline: PipelineStats,
    pub reference_count: usize,
    pub tracked_tickers: usize,
    pub top_gainers: Vec<(Ticker, GainerRecord)>,
}

impl SessionMetrics {
    pub fn from_stats(
        rest: Option<RestClientStats>,
        ws: Option<WebSocketStats>,
        parser: Option<ParserStats>,
        pipeline: PipelineStats,
        reference_count: usize,
        tracked_tickers: usize,
        top_gainers: Vec<(Ticker, GainerRecord)>,
    ) -> Self {
        Self { rest, ws, parser, pipeline, reference_count, tracked_tickers, top_gainers }
    }

    /// Failed requests, decode errors, malformed events and transport errors combined
    pub fn total_errors(&self) -> u64 {
        let rest_errs = self.rest.as_ref().map(|r| r.requests_failed).unwrap_or(0);
        let decode = self.pipeline.decode_errors;
        let malformed = self.parser.as_ref().map(|p| p.malformed_events).unwrap_or(0);
        let ws_errs = self.ws.as_ref().map(|w| w.error_count).unwrap_or(0);
        rest_errs + decode + malformed + ws_errs
    }

    pub fn print_report(&self) {
        info!("=== SESSION METRICS ===");

        if let Some(rest) = &self.rest {
            info!("  REST:       sent={} ok={} fail={}",
                rest.requests_sent, rest.requests_succeeded, rest.requests_failed);
        }

        if let Some(ws) = &self.ws {
            info!("  WebSocket:  msgs={} errs={} state={}",
                ws.message_count, ws.error_count, ws.state);
        }

        if let Some(p) = &self.parser {
            info!("  Parser:     parsed={} errs={} malformed={} bars={} status={} ignored={}",
                p.messages_parsed, p.parse_errors, p.malformed_events,
                p.minute_bar_count, p.status_count, p.ignored_count);
        }

        info!("  Pipeline:   refs={} tracked={} bars={} unknown={} alerts={}",
            self.reference_count, self.tracked_tickers, self.pipeline.bars_processed,
            self.pipeline.unknown_ticker_bars, self.pipeline.alerts_emitted);

        if self.top_gainers.is_empty() {
            info!("  Gainers:    none");
            return;
        }
        info!("  Top gainers:");
        for (rank, (ticker, rec)) in self.top_gainers.iter().enumerate() {
            info!("    {:>2}. {:<6} {:>7.2}% ${:.2} vol={} hits={}",
                rank + 1, ticker, rec.pct_change, rec.price,
                format_thousands(rec.volume), rec.hits);
        }
    }
}

impl fmt::Display for SessionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionMetrics(bars={}, alerts={}, gainers={}, errors={})",
            self.pipeline.bars_processed,
            self.pipeline.alerts_emitted,
            self.top_gainers.len(),
            self.total_errors()
        )
    }
}
