//! Dual-moving-average momentum detector
//!
//! Fast/slow SMA spread on closes, normalized by the rolling standard
//! deviation of the close over the slow window so the signal threshold is
//! comparable across instruments with very different price scales.

use serde_json::json;

use super::Detector;
use crate::config::EffectiveConfig;
use crate::indicators::{rolling_std, sma};
use crate::types::{Abstain, Bias, DetectorScore, MarketBar};

const EPS: f64 = 1e-9;

pub struct MomentumDetector;

impl Detector for MomentumDetector {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn analyze(
        &self,
        bars: &[MarketBar],
        config: &EffectiveConfig,
    ) -> Result<DetectorScore, Abstain> {
        let momentum = &config.analysis.momentum;
        if bars.len() < momentum.slow_period {
            return Err(Abstain::InsufficientHistory {
                have: bars.len(),
                need: momentum.slow_period,
            });
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = sma(&closes, momentum.fast_period)
            .last()
            .copied()
            .flatten()
            .unwrap_or(0.0);
        let slow = sma(&closes, momentum.slow_period)
            .last()
            .copied()
            .flatten()
            .unwrap_or(0.0);
        let volatility = rolling_std(&closes, momentum.slow_period)
            .last()
            .copied()
            .flatten()
            .unwrap_or(0.0);

        // Spread in volatility units; a dead-flat window carries no signal.
        let normalized = if volatility > EPS {
            (fast - slow) / volatility
        } else {
            0.0
        };

        let bias = if normalized > momentum.signal_threshold {
            Bias::Bullish
        } else if normalized < -momentum.signal_threshold {
            Bias::Bearish
        } else {
            Bias::Neutral
        };

        let evidence = json!({
            "fast": fast,
            "slow": slow,
            "spread": fast - slow,
            "volatility": volatility,
            "normalized_spread": normalized,
        });

        Ok(DetectorScore::new(
            self.name(),
            normalized.abs().min(1.0),
            bias,
            evidence,
        ))
    }
}
