//! Core data types used across the signal engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for bar data
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("trade split must be non-negative: buy={buy}, sell={sell}")]
    NegativeTradeSplit { buy: f64, sell: f64 },
}

/// One time bucket of market data for a single instrument.
///
/// Timestamps are exchange-local wall time as recorded by the ingestion
/// collaborator. The buy/sell trade-volume split is optional; the order-flow
/// detector abstains when it is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_volume: Option<f64>,
}

impl MarketBar {
    /// Create a new bar with validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        buy_volume: Option<f64>,
        sell_volume: Option<f64>,
    ) -> Result<Self, BarValidationError> {
        let bar = Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            buy_volume,
            sell_volume,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Validate the bar data
    pub fn validate(&self) -> Result<(), BarValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        let buy = self.buy_volume.unwrap_or(0.0);
        let sell = self.sell_volume.unwrap_or(0.0);
        if buy < 0.0 || sell < 0.0 {
            return Err(BarValidationError::NegativeTradeSplit { buy, sell });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Net aggressive-volume imbalance (buy minus sell), if the split is known
    pub fn trade_imbalance(&self) -> Option<f64> {
        match (self.buy_volume, self.sell_volume) {
            (Some(buy), Some(sell)) => Some(buy - sell),
            _ => None,
        }
    }
}

/// Instrument symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every score, signal, and log line each cycle.
/// Using Arc<str> instead of String reduces heap allocations from O(n) to O(1) per clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directional bias reported by a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

/// Direction of an emitted signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl From<Bias> for Direction {
    fn from(bias: Bias) -> Self {
        match bias {
            Bias::Bullish => Direction::Long,
            Bias::Bearish => Direction::Short,
            Bias::Neutral => Direction::Flat,
        }
    }
}

/// A detector's non-fatal declination to produce a score.
///
/// Distinct from an error: an abstaining detector is excluded from the
/// fusion vote and the confidence mean, it does not abort the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Abstain {
    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("buy/sell trade split not available")]
    MissingTradeSplit,
}

/// Score produced by one detector for one analysis cycle.
///
/// Immutable once created. `score` is in [0,1]; the evidence payload carries
/// method-specific diagnostics (Wyckoff phase label, flow ratios, MA values).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorScore {
    pub detector: String,
    pub score: f64,
    pub bias: Bias,
    #[serde(default)]
    pub evidence: serde_json::Value,
}

impl DetectorScore {
    pub fn new(detector: &str, score: f64, bias: Bias, evidence: serde_json::Value) -> Self {
        Self {
            detector: detector.to_string(),
            score: score.clamp(0.0, 1.0),
            bias,
            evidence,
        }
    }
}

/// Why a completed analysis did not produce a tradeable signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Confidence below the profile's minimum
    LowConfidence,
    /// Confirmation required but fewer than 2 detectors agree
    NoConfirmation,
    /// Projected risk/reward below the profile's minimum
    PoorRiskReward,
    /// No strict majority among the voting detectors
    NoDirection,
    /// Signal timestamp outside the instrument's trading hours
    OutsideTradingHours,
    /// Instrument disabled in configuration
    AssetDisabled,
}

/// Gating verdict recorded on every signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Candidate price levels for a signal, tick-aligned by the asset policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// The terminal output of one analysis cycle for one instrument.
///
/// Never mutated after emission; superseded wholesale by the next cycle's
/// signal for the same instrument. Rejected signals carry direction `Flat`
/// so a stale or rejected record can never look tradeable downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: Symbol,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub confidence: f64,
    pub risk_reward: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<SignalLevels>,
    pub scores: Vec<DetectorScore>,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}
