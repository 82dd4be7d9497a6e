//! Analytical detectors
//!
//! One module per method. All detectors implement the same capability and
//! are selected per cycle by the `enabled` flags in the effective config.

pub mod momentum;
pub mod order_flow;
pub mod wyckoff;

use crate::config::EffectiveConfig;
use crate::types::{Abstain, DetectorScore, MarketBar};

/// Common capability of the analytical methods.
///
/// `Ok` is a fresh score for this cycle; `Err` is a non-fatal abstention
/// (the detector is excluded from fusion, the cycle continues).
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyze one instrument's bar window under the effective config.
    ///
    /// Bars must be ordered oldest-first. Detectors never mutate shared
    /// state, so one instance can serve concurrent cycles.
    fn analyze(
        &self,
        bars: &[MarketBar],
        config: &EffectiveConfig,
    ) -> Result<DetectorScore, Abstain>;
}

/// Instantiate the detectors enabled for this cycle
pub fn enabled_detectors(config: &EffectiveConfig) -> Vec<Box<dyn Detector>> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::with_capacity(3);
    if config.analysis.wyckoff.enabled {
        detectors.push(Box::new(wyckoff::WyckoffDetector));
    }
    if config.analysis.order_flow.enabled {
        detectors.push(Box::new(order_flow::OrderFlowDetector));
    }
    if config.analysis.momentum.enabled {
        detectors.push(Box::new(momentum::MomentumDetector));
    }
    detectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_selection_follows_enabled_flags() {
        let config = Config::default();
        let mut effective = config.resolve(None).unwrap();

        let names: Vec<&str> = enabled_detectors(&effective)
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(names, vec!["wyckoff", "order_flow", "momentum"]);

        effective.analysis.order_flow.enabled = false;
        let names: Vec<&str> = enabled_detectors(&effective)
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(names, vec!["wyckoff", "momentum"]);
    }
}
