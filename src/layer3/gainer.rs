// Gainer Evaluator - momentum gainer rule
// pct = (close - prev_close) / prev_close * 100
// qualifies <=> pct >= 5.0 AND cumulative volume >= 2,000,000 AND close >= 3.0

use serde::Serialize;

/// Minimum move from the previous session close, in percent
pub const MIN_PCT_CHANGE: f64 = 5.0;
/// Minimum cumulative volume since stream start
pub const MIN_VOLUME: u64 = 2_000_000;
/// Minimum current price
pub const MIN_PRICE: f64 = 3.0;

/// Outcome of evaluating one bar against the gainer rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GainerEvaluation {
    pub pct_change: f64,
    pub meets_pct: bool,
    pub meets_volume: bool,
    pub meets_price: bool,
}

impl GainerEvaluation {
    pub fn qualifies(&self) -> bool {
        self.meets_pct && self.meets_volume && self.meets_price
    }
}

/// Percent move of `close` relative to `prev_close`; `None` when the
/// reference is not a positive finite price.
pub fn pct_change(prev_close: f64, close: f64) -> Option<f64> {
    if !prev_close.is_finite() || prev_close <= 0.0 {
        return None;
    }
    Some((close - prev_close) / prev_close * 100.0)
}

/// Evaluate the rule. `None` means the ticker cannot be evaluated
/// (no usable reference price); it never qualifies.
pub fn evaluate(prev_close: f64, close: f64, cumulative_volume: u64) -> Option<GainerEvaluation> {
    let pct = pct_change(prev_close, close)?;
    Some(GainerEvaluation {
        pct_change: pct,
        meets_pct: pct >= MIN_PCT_CHANGE,
        meets_volume: cumulative_volume >= MIN_VOLUME,
        meets_price: close >= MIN_PRICE,
    })
}

/// Shorthand for `evaluate(..).qualifies()`
pub fn qualifies(prev_close: f64, close: f64, cumulative_volume: u64) -> bool {
    evaluate(prev_close, close, cumulative_volume)
        .map(|e| e.qualifies())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(p: f64, c: f64, v: u64) -> bool {
        ((c - p) / p * 100.0 >= 5.0) && (v >= 2_000_000) && (c >= 3.0)
    }

    #[test]
    fn test_matches_rule_over_grid() {
        let prev = [0.5, 2.0, 3.0, 10.0, 100.0, 250.0];
        let moves = [-0.2, 0.0, 0.049, 0.05, 0.07, 0.25, 1.0];
        let volumes = [0u64, 1_999_999, 2_000_000, 5_000_000];

        for &p in &prev {
            for &m in &moves {
                let c = p * (1.0 + m);
                for &v in &volumes {
                    assert_eq!(qualifies(p, c, v), rule(p, c, v), "p={} c={} v={}", p, c, v);
                }
            }
        }
    }

    #[test]
    fn test_non_positive_reference_never_qualifies() {
        assert_eq!(evaluate(0.0, 10.0, 10_000_000), None);
        assert_eq!(evaluate(-5.0, 10.0, 10_000_000), None);
        assert_eq!(evaluate(f64::NAN, 10.0, 10_000_000), None);
        assert!(!qualifies(0.0, 10.0, 10_000_000));
    }

    #[test]
    fn test_volume_short() {
        let e = evaluate(100.0, 106.0, 1_500_000).unwrap();
        assert!((e.pct_change - 6.0).abs() < 1e-9);
        assert!(e.meets_pct && e.meets_price);
        assert!(!e.meets_volume);
        assert!(!e.qualifies());
    }

    #[test]
    fn test_price_floor() {
        let e = evaluate(2.0, 2.5, 5_000_000).unwrap();
        assert!((e.pct_change - 25.0).abs() < 1e-9);
        assert!(!e.meets_price);
        assert!(!e.qualifies());
    }

    #[test]
    fn test_exact_thresholds_qualify() {
        // boundaries are inclusive
        assert!(qualifies(100.0, 105.0, MIN_VOLUME));
        assert!(qualifies(2.5, 3.0, MIN_VOLUME)); // +20% at the price floor
        assert!(!qualifies(100.0, 104.99, MIN_VOLUME));
    }
}
