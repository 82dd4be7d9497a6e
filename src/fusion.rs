//! Signal fusion
//!
//! Combines the per-method detector scores into one directional signal with
//! a confidence value, then applies the profile's gates in a fixed order:
//! direction, confidence, confirmation, risk/reward. Rejections are normal
//! outcomes recorded on the signal, never errors.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::debug;

use crate::config::EffectiveConfig;
use crate::types::{
    Bias, DetectorScore, Direction, RejectReason, Signal, SignalLevels, Symbol, Verdict,
};

/// Minimum number of agreeing detectors when confirmation is required
const CONFIRMATION_QUORUM: usize = 2;

/// Fuse the non-abstaining detector scores into one signal.
///
/// `scores` holds exactly one entry per enabled, non-abstaining detector;
/// abstentions are excluded upstream and count neither in the vote nor in
/// the confidence mean. `risk_reward` and `levels` come from the level
/// collaborator; the fusion only consumes the ratio.
pub fn fuse(
    instrument: &Symbol,
    timestamp: DateTime<Utc>,
    scores: Vec<DetectorScore>,
    risk_reward: f64,
    levels: Option<SignalLevels>,
    config: &EffectiveConfig,
) -> Signal {
    let candidate = majority_bias(&scores);
    let confidence = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64
    };

    let verdict = apply_gates(candidate, confidence, risk_reward, &scores, config);

    if let Verdict::Rejected(reason) = verdict {
        debug!(
            instrument = %instrument,
            ?reason,
            confidence,
            risk_reward,
            "signal rejected"
        );
    }

    // A rejected signal must never look tradeable downstream.
    let direction = if verdict.is_accepted() {
        Direction::from(candidate)
    } else {
        Direction::Flat
    };
    let levels = if verdict.is_accepted() { levels } else { None };

    Signal {
        instrument: instrument.clone(),
        timestamp,
        direction,
        confidence,
        risk_reward,
        levels,
        scores,
        verdict,
        profile: config.profile.clone(),
    }
}

/// The bias with a strictly greatest vote count, or `Neutral` when the top
/// count is tied. The engine never guesses a direction from a tie.
pub(crate) fn majority_bias(scores: &[DetectorScore]) -> Bias {
    let counts = scores.iter().map(|s| s.bias).counts();
    let Some((&leader, &top)) = counts.iter().max_by_key(|(_, &count)| count) else {
        return Bias::Neutral;
    };
    let tied = counts.values().filter(|&&count| count == top).count();
    if tied > 1 {
        Bias::Neutral
    } else {
        leader
    }
}

fn apply_gates(
    candidate: Bias,
    confidence: f64,
    risk_reward: f64,
    scores: &[DetectorScore],
    config: &EffectiveConfig,
) -> Verdict {
    let gates = &config.signals;

    if candidate == Bias::Neutral {
        return Verdict::Rejected(RejectReason::NoDirection);
    }

    if confidence < gates.min_confidence {
        return Verdict::Rejected(RejectReason::LowConfidence);
    }

    if gates.confirmation_required {
        let agreeing = scores.iter().filter(|s| s.bias == candidate).count();
        if agreeing < CONFIRMATION_QUORUM {
            return Verdict::Rejected(RejectReason::NoConfirmation);
        }
    }

    if risk_reward < gates.risk_reward_min {
        return Verdict::Rejected(RejectReason::PoorRiskReward);
    }

    Verdict::Accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn score(detector: &str, value: f64, bias: Bias) -> DetectorScore {
        DetectorScore::new(detector, value, bias, serde_json::Value::Null)
    }

    fn fuse_with(profile: &str, scores: Vec<DetectorScore>, risk_reward: f64) -> Signal {
        let config = Config::default();
        let effective = config.resolve(Some(profile)).unwrap();
        fuse(
            &Symbol::new("winfut"),
            Utc::now(),
            scores,
            risk_reward,
            None,
            &effective,
        )
    }

    #[test]
    fn test_single_detector_needs_confirmation_under_moderado() {
        let signal = fuse_with(
            "moderado",
            vec![score("momentum", 0.9, Bias::Bullish)],
            2.0,
        );
        assert_eq!(signal.verdict, Verdict::Rejected(RejectReason::NoConfirmation));
        assert_eq!(signal.direction, Direction::Flat);
    }

    #[test]
    fn test_single_detector_accepted_under_agressivo() {
        let signal = fuse_with(
            "agressivo",
            vec![score("momentum", 0.55, Bias::Bullish)],
            1.2,
        );
        assert_eq!(signal.verdict, Verdict::Accepted);
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn test_conservador_rejects_diluted_confidence() {
        let signal = fuse_with(
            "conservador",
            vec![
                score("wyckoff", 0.8, Bias::Bullish),
                score("order_flow", 0.8, Bias::Bullish),
                score("momentum", 0.3, Bias::Neutral),
            ],
            2.5,
        );
        // Neutral voters dilute the mean even when the direction is clear.
        assert_relative_eq!(signal.confidence, 1.9 / 3.0, epsilon = 1e-9);
        assert_eq!(signal.verdict, Verdict::Rejected(RejectReason::LowConfidence));
    }

    #[test]
    fn test_three_way_tie_is_flat() {
        let signal = fuse_with(
            "agressivo",
            vec![
                score("wyckoff", 0.9, Bias::Bullish),
                score("order_flow", 0.9, Bias::Bearish),
                score("momentum", 0.9, Bias::Neutral),
            ],
            2.0,
        );
        assert_eq!(signal.verdict, Verdict::Rejected(RejectReason::NoDirection));
        assert_eq!(signal.direction, Direction::Flat);
    }

    #[test]
    fn test_two_against_one_wins() {
        let signal = fuse_with(
            "moderado",
            vec![
                score("wyckoff", 0.8, Bias::Bearish),
                score("order_flow", 0.7, Bias::Bearish),
                score("momentum", 0.6, Bias::Bullish),
            ],
            1.8,
        );
        assert_eq!(signal.verdict, Verdict::Accepted);
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn test_poor_risk_reward_rejected() {
        let signal = fuse_with(
            "moderado",
            vec![
                score("wyckoff", 0.8, Bias::Bullish),
                score("momentum", 0.8, Bias::Bullish),
            ],
            1.0,
        );
        assert_eq!(signal.verdict, Verdict::Rejected(RejectReason::PoorRiskReward));
    }

    #[test]
    fn test_no_voters_is_flat() {
        let signal = fuse_with("agressivo", vec![], 2.0);
        assert_eq!(signal.verdict, Verdict::Rejected(RejectReason::NoDirection));
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn test_rejected_signal_drops_levels() {
        let config = Config::default();
        let effective = config.resolve(Some("moderado")).unwrap();
        let levels = SignalLevels {
            entry: 100.0,
            stop_loss: 98.0,
            take_profit: 104.0,
        };
        let signal = fuse(
            &Symbol::new("winfut"),
            Utc::now(),
            vec![score("momentum", 0.9, Bias::Bullish)],
            2.0,
            Some(levels),
            &effective,
        );
        assert!(!signal.verdict.is_accepted());
        assert!(signal.levels.is_none());
    }
}
