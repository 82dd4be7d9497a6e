//! Analysis engine
//!
//! One `analyze` call is one full cycle for one instrument: fetch bars,
//! run every enabled detector, fuse the votes, project levels, apply the
//! asset policy, and record accepted signals in the signal file.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::MarketData;
use crate::detectors::enabled_detectors;
use crate::policy::AssetPolicy;
use crate::sink::SignalSink;
use crate::types::{Direction, MarketBar, RejectReason, Signal, Symbol, Verdict};
use crate::{fusion, levels};

pub struct AnalysisEngine {
    config: Config,
    data: Arc<dyn MarketData>,
    sink: Option<SignalSink>,
}

impl AnalysisEngine {
    pub fn new(config: Config, data: Arc<dyn MarketData>, sink: Option<SignalSink>) -> Self {
        AnalysisEngine { config, data, sink }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one analysis cycle for `instrument` under the given profile.
    ///
    /// Rejections come back as signals carrying their reason; only unknown
    /// instruments, unknown profiles, and data-layer failures are errors.
    pub async fn analyze(&self, instrument: &Symbol, profile: Option<&str>) -> Result<Signal> {
        let asset = self
            .config
            .assets
            .get(instrument.as_str())
            .with_context(|| format!("unknown instrument: {instrument}"))?;

        // Disabled instruments never touch the database.
        if !asset.enabled {
            return Ok(disabled_signal(instrument, profile));
        }

        let effective = Arc::new(self.config.resolve(profile)?);

        let bars = self
            .data
            .fetch(instrument, effective.analysis.lookback_periods)?;
        let bars = Arc::new(filter_valid(instrument, bars));

        // Detectors are pure CPU over a shared window; run them off the
        // async workers and join before fusing.
        let mut handles = Vec::new();
        for detector in enabled_detectors(&effective) {
            let bars = Arc::clone(&bars);
            let config = Arc::clone(&effective);
            handles.push(tokio::task::spawn_blocking(move || {
                let result = detector.analyze(&bars, &config);
                (detector.name(), result)
            }));
        }

        let mut scores = Vec::new();
        for handle in handles {
            let (name, result) = handle.await.context("detector task panicked")?;
            match result {
                Ok(score) => scores.push(score),
                Err(reason) => {
                    debug!(instrument = %instrument, detector = name, %reason, "detector abstained");
                }
            }
        }

        let candidate = fusion::majority_bias(&scores);
        let (levels, risk_reward) = levels::project(&bars, candidate)
            .map_or((None, 0.0), |(l, r)| (Some(l), r));

        let timestamp = bars.last().map(|b| b.timestamp).unwrap_or_else(Utc::now);
        let signal = fusion::fuse(
            instrument,
            timestamp,
            scores,
            risk_reward,
            levels,
            &effective,
        );
        let signal = AssetPolicy::new(asset).apply(signal);

        if signal.verdict.is_accepted() {
            info!(
                instrument = %instrument,
                direction = ?signal.direction,
                confidence = signal.confidence,
                risk_reward = signal.risk_reward,
                profile = ?signal.profile,
                "signal accepted"
            );
            if let Some(sink) = &self.sink {
                sink.record(&signal)?;
            }
        }

        Ok(signal)
    }
}

fn disabled_signal(instrument: &Symbol, profile: Option<&str>) -> Signal {
    Signal {
        instrument: instrument.clone(),
        timestamp: Utc::now(),
        direction: Direction::Flat,
        confidence: 0.0,
        risk_reward: 0.0,
        levels: None,
        scores: vec![],
        verdict: Verdict::Rejected(RejectReason::AssetDisabled),
        profile: profile.map(String::from),
    }
}

/// Drop bars that fail validation; a partially corrupt window is analyzed
/// with what remains.
fn filter_valid(instrument: &Symbol, bars: Vec<MarketBar>) -> Vec<MarketBar> {
    let total = bars.len();
    let valid: Vec<MarketBar> = bars
        .into_iter()
        .filter(|bar| match bar.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(instrument = %instrument, timestamp = %bar.timestamp, error = %e, "skipping invalid bar");
                false
            }
        })
        .collect();

    if valid.len() < total {
        warn!(
            instrument = %instrument,
            skipped = total - valid.len(),
            "window contains invalid bars"
        );
    }
    valid
}
