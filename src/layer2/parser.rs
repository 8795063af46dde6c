// Message Parser - live stream payloads
// Each message is a JSON array of events tagged by "ev"; only minute
// aggregates ("AM") and status events are decoded, the rest pass through.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::MinuteBar;

pub const EVENT_MINUTE_AGGREGATE: &str = "AM";
pub const EVENT_STATUS: &str = "status";

// ============================================================================
// Parsed Message Types
// ============================================================================

/// Parsed per-minute aggregate bar
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ParsedMinuteBar {
    pub ticker: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: u64,
    pub accumulated_volume: Option<u64>,
    pub vwap: Option<f64>,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

/// Parsed status/control event (connected, auth_success, auth_failed, success, ...)
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ParsedStatus {
    pub status: String,
    pub message: String,
}

impl ParsedStatus {
    pub fn is_auth_failure(&self) -> bool {
        self.status == "auth_failed"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    MinuteBar(ParsedMinuteBar),
    Status(ParsedStatus),
    /// Any other event type; carries only the discriminator
    Ignored(String),
}

// ============================================================================
// Serde Structures (raw provider JSON)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawMinuteAggregate {
    #[serde(rename = "sym", alias = "T")]
    ticker: String,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
    #[serde(rename = "o", default)]
    open: Option<f64>,
    #[serde(rename = "h", default)]
    high: Option<f64>,
    #[serde(rename = "l", default)]
    low: Option<f64>,
    #[serde(rename = "av", default)]
    accumulated_volume: Option<f64>,
    #[serde(rename = "vw", default)]
    vwap: Option<f64>,
    #[serde(rename = "s", default)]
    start_ms: Option<i64>,
    #[serde(rename = "e", default)]
    end_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Expected a JSON array of events, got {0}")]
    NotAnArray(&'static str),
    #[error("Malformed {event} event: {reason}")]
    MalformedEvent { event: String, reason: String },
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Convert a provider volume (sent as a JSON number, sometimes fractional) to shares
fn parse_volume(value: f64, field: &'static str) -> Result<u64, ParseError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ParseError::InvalidValue { field, value: value.to_string() });
    }
    Ok(value.round() as u64)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ============================================================================
// MessageParser
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ParserStats {
    pub messages_parsed: u64,
    pub parse_errors: u64,
    pub malformed_events: u64,
    pub minute_bar_count: u64,
    pub status_count: u64,
    pub ignored_count: u64,
}

impl ParserStats {
    pub fn error_rate(&self) -> f64 {
        let total = self.messages_parsed + self.parse_errors;
        if total > 0 {
            self.parse_errors as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl fmt::Display for ParserStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ParserStats(messages={}, errors={}, malformed={}, bars={}, status={}, ignored={})",
            self.messages_parsed, self.parse_errors, self.malformed_events,
            self.minute_bar_count, self.status_count, self.ignored_count
        )
    }
}

/// Stateless apart from its counters
#[derive(Debug, Default)]
pub struct MessageParser {
    pub stats: ParserStats,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one stream message.
    ///
    /// A payload that is not a JSON array fails as a whole. Inside a valid
    /// array, a malformed minute aggregate is logged, counted and dropped
    /// while its siblings are still returned.
    pub fn parse(&mut self, raw_json: &str) -> Result<Vec<ParsedMessage>, ParseError> {
        let value: serde_json::Value = match serde_json::from_str(raw_json) {
            Ok(v) => v,
            Err(e) => {
                self.stats.parse_errors += 1;
                return Err(ParseError::InvalidJson(e.to_string()));
            }
        };

        let events = match value {
            serde_json::Value::Array(events) => events,
            other => {
                self.stats.parse_errors += 1;
                return Err(ParseError::NotAnArray(json_kind(&other)));
            }
        };

        self.stats.messages_parsed += 1;

        let mut parsed = Vec::with_capacity(events.len());
        for event in events {
            match self.parse_event(event) {
                Ok(msg) => parsed.push(msg),
                Err(e) => {
                    self.stats.malformed_events += 1;
                    warn!(error = %e, "Dropping malformed event");
                }
            }
        }
        Ok(parsed)
    }

    fn parse_event(&mut self, event: serde_json::Value) -> Result<ParsedMessage, ParseError> {
        let event_type = event
            .get("ev")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match event_type.as_str() {
            EVENT_MINUTE_AGGREGATE => {
                let bar = parse_minute_aggregate(event)?;
                self.stats.minute_bar_count += 1;
                Ok(ParsedMessage::MinuteBar(bar))
            }
            EVENT_STATUS => {
                let raw: RawStatus = serde_json::from_value(event).map_err(|e| {
                    ParseError::MalformedEvent { event: EVENT_STATUS.to_string(), reason: e.to_string() }
                })?;
                self.stats.status_count += 1;
                Ok(ParsedMessage::Status(ParsedStatus { status: raw.status, message: raw.message }))
            }
            _ => {
                debug!(event_type = %event_type, "Ignoring event");
                self.stats.ignored_count += 1;
                Ok(ParsedMessage::Ignored(event_type))
            }
        }
    }
}

/// Decode a single "AM" event object
pub fn parse_minute_aggregate(event: serde_json::Value) -> Result<ParsedMinuteBar, ParseError> {
    let raw: RawMinuteAggregate = serde_json::from_value(event).map_err(|e| {
        ParseError::MalformedEvent { event: EVENT_MINUTE_AGGREGATE.to_string(), reason: e.to_string() }
    })?;

    if !raw.close.is_finite() {
        return Err(ParseError::InvalidValue { field: "c", value: raw.close.to_string() });
    }

    Ok(ParsedMinuteBar {
        ticker: raw.ticker,
        open: raw.open,
        high: raw.high,
        low: raw.low,
        close: raw.close,
        volume: parse_volume(raw.volume, "v")?,
        accumulated_volume: raw.accumulated_volume.map(|v| parse_volume(v, "av")).transpose()?,
        vwap: raw.vwap,
        start_ms: raw.start_ms,
        end_ms: raw.end_ms,
    })
}

// ============================================================================
// Conversions from Parsed* types to core types
// ============================================================================

impl From<ParsedMinuteBar> for MinuteBar {
    fn from(parsed: ParsedMinuteBar) -> Self {
        Self {
            ticker: parsed.ticker,
            close: parsed.close,
            volume: parsed.volume,
            start_ms: parsed.start_ms,
            end_ms: parsed.end_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minute_aggregate_full() {
        let mut parser = MessageParser::new();
        let raw = r#"[{"ev":"AM","sym":"AAPL","v":1500000,"av":9000000,"op":100.1,"vw":105.9,"o":105.5,"c":106.0,"h":106.2,"l":105.4,"a":104.1,"z":12,"s":1717770000000,"e":1717770060000}]"#;

        let parsed = parser.parse(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        match &parsed[0] {
            ParsedMessage::MinuteBar(bar) => {
                assert_eq!(bar.ticker, "AAPL");
                assert_eq!(bar.close, 106.0);
                assert_eq!(bar.volume, 1_500_000);
                assert_eq!(bar.accumulated_volume, Some(9_000_000));
                assert_eq!(bar.start_ms, Some(1_717_770_000_000));
            }
            other => panic!("expected minute bar, got {:?}", other),
        }
        assert_eq!(parser.stats.minute_bar_count, 1);
    }

    #[test]
    fn test_ticker_alias() {
        let bar = parse_minute_aggregate(serde_json::json!({"ev":"AM","T":"MSFT","c":410.0,"v":10})).unwrap();
        assert_eq!(bar.ticker, "MSFT");
    }

    #[test]
    fn test_status_and_other_events() {
        let mut parser = MessageParser::new();
        let raw = r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"},{"ev":"T","sym":"AAPL","p":1.0}]"#;

        let parsed = parser.parse(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        match &parsed[0] {
            ParsedMessage::Status(s) => assert!(s.is_auth_failure()),
            other => panic!("expected status, got {:?}", other),
        }
        assert_eq!(parsed[1], ParsedMessage::Ignored("T".to_string()));
        assert_eq!(parser.stats.ignored_count, 1);
    }

    #[test]
    fn test_invalid_json_and_non_array() {
        let mut parser = MessageParser::new();
        assert!(matches!(parser.parse("not json"), Err(ParseError::InvalidJson(_))));
        assert!(matches!(
            parser.parse(r#"{"ev":"AM"}"#),
            Err(ParseError::NotAnArray("object"))
        ));
        assert_eq!(parser.stats.parse_errors, 2);
        assert_eq!(parser.stats.messages_parsed, 0);
    }

    #[test]
    fn test_empty_array() {
        let mut parser = MessageParser::new();
        assert!(parser.parse("[]").unwrap().is_empty());
        assert_eq!(parser.stats.messages_parsed, 1);
    }

    #[test]
    fn test_malformed_event_does_not_drop_siblings() {
        let mut parser = MessageParser::new();
        let raw = r#"[{"ev":"AM","sym":"BAD","v":100},{"ev":"AM","sym":"GOOD","c":5.0,"v":100},{"ev":"AM","sym":"NEG","c":5.0,"v":-1}]"#;

        let parsed = parser.parse(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(matches!(&parsed[0], ParsedMessage::MinuteBar(b) if b.ticker == "GOOD"));
        assert_eq!(parser.stats.malformed_events, 2);
    }

    #[test]
    fn test_fractional_volume_rounds() {
        let bar = parse_minute_aggregate(serde_json::json!({"ev":"AM","sym":"X","c":3.5,"v":1234.6})).unwrap();
        assert_eq!(bar.volume, 1235);
    }

    #[test]
    fn test_into_core_minute_bar() {
        let bar = parse_minute_aggregate(serde_json::json!({"ev":"AM","sym":"AAPL","c":107.0,"v":600000})).unwrap();
        let core: MinuteBar = bar.into();
        assert_eq!(core, MinuteBar::new("AAPL", 107.0, 600_000));
    }
}
