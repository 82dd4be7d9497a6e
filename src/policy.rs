//! Per-asset policy
//!
//! Applies instrument-specific constraints to a candidate signal: the
//! enabled flag, the `[start, end)` trading-hours window, and tick
//! alignment of all price levels. Policy rejections are recorded on the
//! signal, they are not errors.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::AssetProfile;
use crate::types::{Direction, RejectReason, Signal, SignalLevels, Verdict};

/// References (does not own) a static asset profile
pub struct AssetPolicy<'a> {
    profile: &'a AssetProfile,
}

impl<'a> AssetPolicy<'a> {
    pub fn new(profile: &'a AssetProfile) -> Self {
        AssetPolicy { profile }
    }

    /// Round a price to the nearest tick multiple.
    ///
    /// Decimal arithmetic keeps tick multiples exact; an f64 computation
    /// drifts on tick sizes like 0.5 applied to large index prices.
    pub fn align_to_tick(&self, price: f64) -> f64 {
        let (Some(price_dec), Some(tick)) = (
            Decimal::from_f64(price),
            Decimal::from_f64(self.profile.tick_size),
        ) else {
            return price;
        };
        if tick.is_zero() {
            return price;
        }
        ((price_dec / tick).round() * tick)
            .to_f64()
            .unwrap_or(price)
    }

    /// Monetary risk of the level set, scaled by the instrument's point value
    pub fn risk_in_currency(&self, levels: &SignalLevels) -> f64 {
        (levels.entry - levels.stop_loss).abs() * self.profile.point_value
    }

    /// Validate and scale a candidate signal.
    ///
    /// Accepted signals get tick-aligned levels; disabled instruments and
    /// out-of-hours timestamps downgrade the verdict instead. A signal the
    /// fusion already rejected passes through untouched, keeping its first
    /// rejection reason.
    pub fn apply(&self, mut signal: Signal) -> Signal {
        if let Verdict::Rejected(_) = signal.verdict {
            return signal;
        }

        if !self.profile.enabled {
            return reject(signal, RejectReason::AssetDisabled);
        }

        if !self.profile.trading_hours.contains(signal.timestamp.time()) {
            debug!(
                instrument = %signal.instrument,
                timestamp = %signal.timestamp,
                "signal outside trading hours"
            );
            return reject(signal, RejectReason::OutsideTradingHours);
        }

        if let Some(levels) = signal.levels {
            let aligned = SignalLevels {
                entry: self.align_to_tick(levels.entry),
                stop_loss: self.align_to_tick(levels.stop_loss),
                take_profit: self.align_to_tick(levels.take_profit),
            };
            debug!(
                instrument = %signal.instrument,
                entry = aligned.entry,
                stop_loss = aligned.stop_loss,
                risk_currency = self.risk_in_currency(&aligned),
                "levels tick-aligned"
            );
            signal.levels = Some(aligned);
        }

        signal
    }
}

fn reject(mut signal: Signal, reason: RejectReason) -> Signal {
    signal.verdict = Verdict::Rejected(reason);
    signal.direction = Direction::Flat;
    signal.levels = None;
    signal
}
