//! Order-flow detector: aggression, absorption, exhaustion
//!
//! Works on the buy/sell trade-volume split. Three independent pieces of
//! evidence, each gated by its own threshold:
//!
//! - aggression: the latest net imbalance is large relative to its own
//!   20-bar moving average
//! - absorption: unusually heavy aggressive volume with unusually little
//!   price progress
//! - exhaustion: a previously strong imbalance fading or flipping sign
//!
//! The composite score is the number of present flags divided by 3. When
//! aggression and exhaustion fire together the evidence is contradictory
//! and exhaustion wins: the bias is forced to neutral.

use serde_json::json;

use super::Detector;
use crate::config::EffectiveConfig;
use crate::indicators::sma;
use crate::types::{Abstain, Bias, DetectorScore, MarketBar};

/// Minimum window: MA20 baseline plus the two 5-bar exhaustion halves
const MIN_BARS: usize = 20;
/// Bars in the "recent" half of the absorption and exhaustion checks
const RECENT_WINDOW: usize = 5;
/// Moving-average period for the imbalance baseline
const BASELINE_PERIOD: usize = 20;

const EPS: f64 = 1e-9;

pub struct OrderFlowDetector;

impl Detector for OrderFlowDetector {
    fn name(&self) -> &'static str {
        "order_flow"
    }

    fn analyze(
        &self,
        bars: &[MarketBar],
        config: &EffectiveConfig,
    ) -> Result<DetectorScore, Abstain> {
        // The trade split defines this detector; without it there is
        // nothing to measure.
        let imbalances: Vec<f64> = bars
            .iter()
            .map(|b| b.trade_imbalance().ok_or(Abstain::MissingTradeSplit))
            .collect::<Result<_, _>>()?;

        if bars.len() < MIN_BARS {
            return Err(Abstain::InsufficientHistory {
                have: bars.len(),
                need: MIN_BARS,
            });
        }

        let flow = &config.analysis.order_flow;
        let n = bars.len();

        // 1. Aggression: latest imbalance vs. its own baseline magnitude
        let baseline = sma(&imbalances, BASELINE_PERIOD)
            .last()
            .copied()
            .flatten()
            .unwrap_or(0.0);
        let last_imbalance = imbalances[n - 1];
        let aggression_strength = last_imbalance / baseline.abs().max(1.0);
        let is_aggressive = aggression_strength.abs() > flow.aggression_threshold;

        // 2. Absorption: volume intensity over price progress, both measured
        // against their own window averages so the ratio is dimensionless.
        let aggressive_volume: Vec<f64> = bars
            .iter()
            .map(|b| b.buy_volume.unwrap_or(0.0) + b.sell_volume.unwrap_or(0.0))
            .collect();
        let recent_volume: f64 = aggressive_volume[n - RECENT_WINDOW..].iter().sum();
        let mean_volume =
            aggressive_volume.iter().sum::<f64>() / n as f64 * RECENT_WINDOW as f64;

        let recent_move = (bars[n - 1].close - bars[n - RECENT_WINDOW].close).abs();
        let mean_move = bars
            .windows(RECENT_WINDOW + 1)
            .map(|w| (w[RECENT_WINDOW].close - w[0].close).abs())
            .sum::<f64>()
            / (n - RECENT_WINDOW) as f64;

        let volume_intensity = recent_volume / mean_volume.max(EPS);
        let price_progress = recent_move / mean_move.max(EPS);
        let absorption_ratio = volume_intensity / price_progress.max(0.25);
        let is_absorption = absorption_ratio > flow.absorption_threshold;

        // 3. Exhaustion: the previous 5-bar imbalance fading or flipping
        let previous: f64 =
            imbalances[n - 2 * RECENT_WINDOW..n - RECENT_WINDOW].iter().sum::<f64>()
                / RECENT_WINDOW as f64;
        let recent: f64 =
            imbalances[n - RECENT_WINDOW..].iter().sum::<f64>() / RECENT_WINDOW as f64;
        let fading = previous * recent < 0.0 || recent.abs() < previous.abs();
        let exhaustion_ratio = previous.abs() / recent.abs().max(1.0);
        let is_exhaustion = fading && exhaustion_ratio > flow.exhaustion_threshold;

        let flags = [is_aggressive, is_absorption, is_exhaustion];
        let score = flags.iter().filter(|&&f| f).count() as f64 / 3.0;

        // Exhaustion is higher-confidence reversal evidence than raw
        // aggression continuation evidence, so a simultaneous fire biases
        // toward caution.
        let net_recent: f64 = imbalances[n - RECENT_WINDOW..].iter().sum();
        let bias = if is_exhaustion && is_aggressive {
            Bias::Neutral
        } else if net_recent > 0.0 {
            Bias::Bullish
        } else if net_recent < 0.0 {
            Bias::Bearish
        } else {
            Bias::Neutral
        };

        let evidence = json!({
            "aggression_strength": aggression_strength,
            "absorption_ratio": absorption_ratio,
            "exhaustion_ratio": exhaustion_ratio,
            "is_aggressive": is_aggressive,
            "is_absorption": is_absorption,
            "is_exhaustion": is_exhaustion,
            "net_recent_imbalance": net_recent,
        });

        Ok(DetectorScore::new(self.name(), score, bias, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::{Duration, Utc};

    /// Bars with a fixed close drift and explicit buy/sell volumes
    fn flow_bars(splits: &[(f64, f64)], closes: &[f64]) -> Vec<MarketBar> {
        let start = Utc::now() - Duration::minutes(splits.len() as i64);
        splits
            .iter()
            .zip(closes)
            .enumerate()
            .map(|(i, (&(buy, sell), &close))| MarketBar {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + 2.0,
                low: close - 2.0,
                close,
                volume: buy + sell,
                buy_volume: Some(buy),
                sell_volume: Some(sell),
            })
            .collect()
    }

    fn effective() -> EffectiveConfig {
        Config::default().resolve(None).unwrap()
    }

    #[test]
    fn test_missing_split_abstains() {
        let mut bars = flow_bars(&[(500.0, 500.0); 25], &[100.0; 25]);
        bars[10].buy_volume = None;
        let result = OrderFlowDetector.analyze(&bars, &effective());
        assert_eq!(result.unwrap_err(), Abstain::MissingTradeSplit);
    }

    #[test]
    fn test_short_window_abstains() {
        let bars = flow_bars(&[(500.0, 500.0); 10], &[100.0; 10]);
        let result = OrderFlowDetector.analyze(&bars, &effective());
        assert_eq!(
            result.unwrap_err(),
            Abstain::InsufficientHistory { have: 10, need: 20 }
        );
    }

    #[test]
    fn test_aggressive_buying_is_bullish() {
        // Balanced flow, then a burst of buy aggression on the last bar.
        let mut splits = vec![(510.0, 500.0); 24];
        splits.push((3000.0, 200.0));
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64 * 0.5).collect();
        let bars = flow_bars(&splits, &closes);

        let score = OrderFlowDetector.analyze(&bars, &effective()).unwrap();
        assert_eq!(score.bias, Bias::Bullish);
        assert_eq!(score.evidence["is_aggressive"], true);
        assert!(score.score >= 1.0 / 3.0);
    }

    #[test]
    fn test_exhaustion_overrides_aggression() {
        // Strong selling for five bars, then a hard flip into heavy buying:
        // both the aggression and exhaustion flags fire, and the
        // contradictory evidence must resolve to neutral.
        let mut splits = vec![(500.0, 520.0); 15];
        splits.extend_from_slice(&[(100.0, 2100.0); 5]);
        splits.extend_from_slice(&[(900.0, 800.0); 4]);
        splits.push((1500.0, 300.0));
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64 * 0.3).collect();
        let bars = flow_bars(&splits, &closes);

        let score = OrderFlowDetector.analyze(&bars, &effective()).unwrap();
        assert_eq!(score.evidence["is_aggressive"], true);
        assert_eq!(score.evidence["is_exhaustion"], true);
        assert_eq!(score.bias, Bias::Neutral);
    }

    #[test]
    fn test_quiet_flow_scores_zero() {
        // Perfectly balanced flow with steady price drift: no flag fires.
        let splits = vec![(500.0, 500.0); 25];
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let bars = flow_bars(&splits, &closes);

        let score = OrderFlowDetector.analyze(&bars, &effective()).unwrap();
        assert_eq!(score.score, 0.0);
        assert_eq!(score.bias, Bias::Neutral);
    }
}
