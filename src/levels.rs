//! Candidate price levels and projected risk/reward
//!
//! This is the level collaborator the fusion engine consumes: entry at the
//! last close, stop and target from the Wyckoff structure levels when they
//! exist, otherwise a percentage fallback. The fusion engine itself only
//! sees the resulting ratio.

use crate::detectors::wyckoff::structure_levels;
use crate::types::{Bias, MarketBar, SignalLevels};

/// Fallback stop distance when no structure levels are available
const FALLBACK_STOP_PCT: f64 = 0.01;
/// Fallback target distance when no structure levels are available
const FALLBACK_TARGET_PCT: f64 = 0.02;

/// Project entry/stop/target for a candidate direction and the resulting
/// risk/reward ratio. `None` for a neutral candidate or an empty window.
pub fn project(bars: &[MarketBar], candidate: Bias) -> Option<(SignalLevels, f64)> {
    let last_close = bars.last()?.close;
    let structure = structure_levels(bars);

    let levels = match candidate {
        Bias::Bullish => SignalLevels {
            entry: last_close,
            stop_loss: structure
                .map(|(support, _)| support)
                .unwrap_or(last_close * (1.0 - FALLBACK_STOP_PCT)),
            take_profit: structure
                .map(|(_, resistance)| resistance)
                .unwrap_or(last_close * (1.0 + FALLBACK_TARGET_PCT)),
        },
        Bias::Bearish => SignalLevels {
            entry: last_close,
            stop_loss: structure
                .map(|(_, resistance)| resistance)
                .unwrap_or(last_close * (1.0 + FALLBACK_STOP_PCT)),
            take_profit: structure
                .map(|(support, _)| support)
                .unwrap_or(last_close * (1.0 - FALLBACK_TARGET_PCT)),
        },
        Bias::Neutral => return None,
    };

    let risk = (levels.entry - levels.stop_loss).abs();
    let reward = (levels.take_profit - levels.entry).abs();
    let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

    Some((levels, risk_reward))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<MarketBar> {
        let start = Utc::now() - Duration::minutes(closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| MarketBar {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
                buy_volume: None,
                sell_volume: None,
            })
            .collect()
    }

    #[test]
    fn test_neutral_candidate_has_no_levels() {
        let bars = bars_from_closes(&[100.0; 30]);
        assert!(project(&bars, Bias::Neutral).is_none());
    }

    #[test]
    fn test_fallback_levels_short_window() {
        // Too few bars for structure levels: percentage fallback applies.
        let bars = bars_from_closes(&[100.0; 5]);
        let (levels, risk_reward) = project(&bars, Bias::Bullish).unwrap();
        assert_relative_eq!(levels.entry, 100.0);
        assert_relative_eq!(levels.stop_loss, 99.0);
        assert_relative_eq!(levels.take_profit, 102.0);
        assert_relative_eq!(risk_reward, 2.0);
    }

    #[test]
    fn test_bearish_mirrors_bullish() {
        let bars = bars_from_closes(&[100.0; 5]);
        let (levels, risk_reward) = project(&bars, Bias::Bearish).unwrap();
        assert!(levels.stop_loss > levels.entry);
        assert!(levels.take_profit < levels.entry);
        assert_relative_eq!(risk_reward, 2.0);
    }

    #[test]
    fn test_structure_levels_used_when_available() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let bars = bars_from_closes(&closes);
        let (levels, _) = project(&bars, Bias::Bullish).unwrap();
        // Stop sits at structural support, below every close in the window
        assert!(levels.stop_loss < 100.0);
        assert!(levels.take_profit > levels.entry);
    }
}
