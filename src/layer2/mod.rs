// Layer 2 - Data Processing & Per-Ticker State
// Decodes stream messages and maintains reference prices, running volume and gainers

pub mod parser;
pub mod reference_store;
pub mod accumulator;
pub mod alert_sink;
pub mod pipeline;
pub mod metrics;

// Re-export commonly used items
pub use parser::{
    MessageParser, ParsedMessage, ParseError, ParserStats,
    ParsedMinuteBar, ParsedStatus, parse_minute_aggregate,
};
pub use reference_store::ReferencePriceStore;
pub use accumulator::TickerAccumulator;
pub use alert_sink::{AlertSink, GainerAlert, GainerRecord};
pub use pipeline::{StreamPipeline, PipelineState, PipelineStats};
pub use metrics::SessionMetrics;
