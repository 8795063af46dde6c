// Momentum Scanner - streaming gainer detection for per-minute equity bars
//
// core   -> types, configuration, logging, trading calendar
// layer1 -> provider connectors (REST reference data, websocket bar stream)
// layer2 -> message parsing, per-ticker state, streaming pipeline
// layer3 -> gainer evaluation

pub mod core;
pub mod layer1;
pub mod layer2;
pub mod layer3;
pub mod app;

pub use app::{Scanner, ScannerError, ScannerOutcome, ReferenceSource, BarSource};
