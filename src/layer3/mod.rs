// Layer 3 - Evaluators
// Turns accumulated per-ticker state into alert decisions

pub mod gainer;

pub use gainer::{
    evaluate, qualifies, pct_change, GainerEvaluation,
    MIN_PCT_CHANGE, MIN_VOLUME, MIN_PRICE,
};
