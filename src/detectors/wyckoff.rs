//! Wyckoff accumulation/distribution detector
//!
//! Classifies recent price/volume structure as accumulation (bullish),
//! distribution (bearish), or neither. Structure is read from two angles:
//! where the last close sits inside the recent support/resistance range,
//! and how often price and volume diverge (price down on rising volume is
//! accumulation evidence, price up on falling volume is distribution
//! evidence). Both angles are normalized into [0,1] and blended; the
//! configured thresholds then decide whether the phase is called.

use serde_json::json;

use super::Detector;
use crate::config::EffectiveConfig;
use crate::types::{Abstain, Bias, DetectorScore, MarketBar};

/// Bars considered for support/resistance and divergence counting
const STRUCTURE_WINDOW: usize = 20;
/// Number of extremes averaged into each structure level
const EXTREME_COUNT: usize = 3;

pub struct WyckoffDetector;

/// Support and resistance from the recent window: the mean of the
/// `EXTREME_COUNT` lowest lows and highest highs. Returns `None` when the
/// range has no width (flat or degenerate data).
pub fn structure_levels(bars: &[MarketBar]) -> Option<(f64, f64)> {
    if bars.len() < STRUCTURE_WINDOW {
        return None;
    }
    let window = &bars[bars.len() - STRUCTURE_WINDOW..];

    let mut lows: Vec<f64> = window.iter().map(|b| b.low).collect();
    let mut highs: Vec<f64> = window.iter().map(|b| b.high).collect();
    lows.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    highs.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let support = lows[..EXTREME_COUNT].iter().sum::<f64>() / EXTREME_COUNT as f64;
    let resistance = highs[..EXTREME_COUNT].iter().sum::<f64>() / EXTREME_COUNT as f64;

    if resistance > support {
        Some((support, resistance))
    } else {
        None
    }
}

/// Count of price/volume divergences in the recent window:
/// (price down on rising volume, price up on falling volume)
fn divergence_counts(bars: &[MarketBar]) -> (usize, usize) {
    let window = &bars[bars.len().saturating_sub(STRUCTURE_WINDOW)..];
    let mut down_volume_up = 0;
    let mut up_volume_down = 0;

    for pair in window.windows(2) {
        let price_change = pair[1].close - pair[0].close;
        let volume_change = pair[1].volume - pair[0].volume;
        if price_change < 0.0 && volume_change > 0.0 {
            down_volume_up += 1;
        } else if price_change > 0.0 && volume_change < 0.0 {
            up_volume_down += 1;
        }
    }

    (down_volume_up, up_volume_down)
}

impl Detector for WyckoffDetector {
    fn name(&self) -> &'static str {
        "wyckoff"
    }

    fn analyze(
        &self,
        bars: &[MarketBar],
        config: &EffectiveConfig,
    ) -> Result<DetectorScore, Abstain> {
        let need = config.analysis.lookback_periods;
        if bars.len() < need {
            return Err(Abstain::InsufficientHistory {
                have: bars.len(),
                need,
            });
        }

        let wyckoff = &config.analysis.wyckoff;
        let last_close = bars[bars.len() - 1].close;

        let levels = structure_levels(bars);
        let (down_volume_up, up_volume_down) = divergence_counts(bars);
        let pairs = (STRUCTURE_WINDOW - 1) as f64;

        // Divergence shares, doubled so a divergence in half the window
        // saturates the evidence.
        let accumulation_divergence = (2.0 * down_volume_up as f64 / pairs).min(1.0);
        let distribution_divergence = (2.0 * up_volume_down as f64 / pairs).min(1.0);

        let (accumulation, distribution, position) = match levels {
            Some((support, resistance)) => {
                let position =
                    ((last_close - support) / (resistance - support)).clamp(0.0, 1.0);
                // Near support + selling absorbed on volume -> accumulation;
                // near resistance + buying on fading volume -> distribution.
                let accumulation = 0.5 * (1.0 - position) + 0.5 * accumulation_divergence;
                let distribution = 0.5 * position + 0.5 * distribution_divergence;
                (accumulation, distribution, Some(position))
            }
            // No usable range: divergences alone, at half weight
            None => (
                0.5 * accumulation_divergence,
                0.5 * distribution_divergence,
                None,
            ),
        };

        // Each phase is called against its own threshold; when both clear,
        // the stronger sub-score wins (accumulation on an exact tie).
        let accumulation_met = accumulation >= wyckoff.accumulation_threshold;
        let distribution_met = distribution >= wyckoff.distribution_threshold;
        let (phase, bias, score) = match (accumulation_met, distribution_met) {
            (true, true) if distribution > accumulation => {
                ("distribution", Bias::Bearish, distribution)
            }
            (true, _) => ("accumulation", Bias::Bullish, accumulation),
            (false, true) => ("distribution", Bias::Bearish, distribution),
            // Neither phase called; report the stronger raw sub-score for
            // diagnostic visibility.
            (false, false) => ("none", Bias::Neutral, accumulation.max(distribution)),
        };

        let evidence = json!({
            "phase": phase,
            "support": levels.map(|(s, _)| s),
            "resistance": levels.map(|(_, r)| r),
            "position_in_range": position,
            "accumulation_score": accumulation,
            "distribution_score": distribution,
            "price_down_volume_up": down_volume_up,
            "price_up_volume_down": up_volume_down,
        });

        Ok(DetectorScore::new(self.name(), score, bias, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::{Duration, Utc};

    fn bars_from_closes(closes: &[f64], volumes: &[f64]) -> Vec<MarketBar> {
        let start = Utc::now() - Duration::minutes(closes.len() as i64);
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| MarketBar {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume,
                buy_volume: None,
                sell_volume: None,
            })
            .collect()
    }

    fn effective(lookback: usize) -> EffectiveConfig {
        let config = Config::default();
        let mut effective = config.resolve(None).unwrap();
        effective.analysis.lookback_periods = lookback;
        effective
    }

    #[test]
    fn test_insufficient_history_abstains() {
        let bars = bars_from_closes(&[100.0; 10], &[1000.0; 10]);
        let result = WyckoffDetector.analyze(&bars, &effective(30));
        assert_eq!(
            result.unwrap_err(),
            Abstain::InsufficientHistory { have: 10, need: 30 }
        );
    }

    #[test]
    fn test_accumulation_near_support() {
        // Price sells off into support while volume keeps rising: every
        // down bar on expanding volume is accumulation evidence.
        let closes: Vec<f64> = (0..30).map(|i| 120.0 - i as f64).collect();
        let volumes: Vec<f64> = (0..30).map(|i| 1000.0 + i as f64 * 50.0).collect();
        let bars = bars_from_closes(&closes, &volumes);

        let score = WyckoffDetector.analyze(&bars, &effective(30)).unwrap();
        assert_eq!(score.bias, Bias::Bullish);
        assert!(score.score >= 0.6, "score was {}", score.score);
        assert_eq!(score.evidence["phase"], "accumulation");
    }

    #[test]
    fn test_distribution_near_resistance() {
        // Price rallies into resistance on fading volume.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let volumes: Vec<f64> = (0..30).map(|i| 3000.0 - i as f64 * 50.0).collect();
        let bars = bars_from_closes(&closes, &volumes);

        let score = WyckoffDetector.analyze(&bars, &effective(30)).unwrap();
        assert_eq!(score.bias, Bias::Bearish);
        assert_eq!(score.evidence["phase"], "distribution");
    }

    #[test]
    fn test_phase_called_on_own_threshold_despite_weaker_subscore() {
        // Flat series with one dip, one spike, and a close in the upper
        // range: accumulation ~0.06, distribution ~0.44, no divergences.
        let mut closes = vec![100.0; 30];
        closes[15] = 96.0;
        closes[18] = 104.0;
        closes[29] = 102.5;
        let bars = bars_from_closes(&closes, &vec![1000.0; 30]);

        let mut effective = effective(30);
        effective.analysis.wyckoff.accumulation_threshold = 0.05;
        effective.analysis.wyckoff.distribution_threshold = 0.6;

        // Distribution is the larger sub-score but misses its threshold;
        // accumulation clears its own and must still be called.
        let score = WyckoffDetector.analyze(&bars, &effective).unwrap();
        assert_eq!(score.evidence["phase"], "accumulation");
        assert_eq!(score.bias, Bias::Bullish);
        let accumulation = score.evidence["accumulation_score"].as_f64().unwrap();
        let distribution = score.evidence["distribution_score"].as_f64().unwrap();
        assert!(distribution > accumulation);
    }

    #[test]
    fn test_neutral_reports_stronger_subscore() {
        // Mid-range drift with flat volume: no phase should be called.
        let closes: Vec<f64> = (0..30)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let volumes = vec![1000.0; 30];
        let bars = bars_from_closes(&closes, &volumes);

        let score = WyckoffDetector.analyze(&bars, &effective(30)).unwrap();
        assert_eq!(score.bias, Bias::Neutral);
        assert_eq!(score.evidence["phase"], "none");

        let accumulation = score.evidence["accumulation_score"].as_f64().unwrap();
        let distribution = score.evidence["distribution_score"].as_f64().unwrap();
        assert!((score.score - accumulation.max(distribution)).abs() < 1e-12);
    }

    #[test]
    fn test_structure_levels_ordering() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 7) as f64).collect();
        let bars = bars_from_closes(&closes, &vec![1000.0; 30]);
        let (support, resistance) = structure_levels(&bars).unwrap();
        assert!(support < resistance);
    }
}
