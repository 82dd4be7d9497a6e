//! Configuration management
//!
//! Handles loading and parsing of the JSON configuration file, load-time
//! validation, and resolution of named strategy profiles into an effective
//! parameter set. Unknown keys in the document are ignored, not errors.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Fatal configuration errors, surfaced once at load or profile selection
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown strategy profile '{0}'")]
    UnknownProfile(String),

    #[error("strategy profile '{0}' is disabled")]
    ProfileDisabled(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default = "default_assets")]
    pub assets: HashMap<String, AssetProfile>,
    #[serde(default)]
    pub mt5_executor: Mt5ExecutorConfig,
    #[serde(default = "default_profiles")]
    pub strategy_profiles: HashMap<String, StrategyProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig::default(),
            analysis: AnalysisConfig::default(),
            signals: SignalConfig::default(),
            assets: default_assets(),
            mt5_executor: Mt5ExecutorConfig::default(),
            strategy_profiles: default_profiles(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate().context("Config validation failed")?;
        Ok(config)
    }

    /// Resolve the effective parameter set for one analysis run.
    ///
    /// With no profile, the globals are returned verbatim. With a profile,
    /// its override sections are merged key-by-key over the globals; keys
    /// the profile does not mention keep their global values. Pure function
    /// of (self, profile name).
    pub fn resolve(&self, profile: Option<&str>) -> Result<EffectiveConfig, ConfigError> {
        let mut effective = EffectiveConfig {
            analysis: self.analysis.clone(),
            signals: self.signals.clone(),
            profile: None,
        };

        if let Some(name) = profile {
            let overrides = self
                .strategy_profiles
                .get(name)
                .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;

            if !overrides.enabled {
                return Err(ConfigError::ProfileDisabled(name.to_string()));
            }

            overrides.apply(&mut effective);
            effective.profile = Some(name.to_string());
        }

        Ok(effective)
    }

    /// Validate the globals and every enabled profile's resolved view.
    ///
    /// Invariants like `fast_period < slow_period` are checked here once,
    /// not per instrument per cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve(None)?.validate_params("defaults")?;

        let mut names: Vec<&String> = self.strategy_profiles.keys().collect();
        names.sort();
        for name in names {
            if self.strategy_profiles[name].enabled {
                self.resolve(Some(name))?.validate_params(name)?;
            }
        }

        for (asset, profile) in &self.assets {
            if profile.tick_size <= 0.0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "asset '{}': tick_size must be positive, got {}",
                    asset, profile.tick_size
                )));
            }
            if profile.point_value <= 0.0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "asset '{}': point_value must be positive, got {}",
                    asset, profile.point_value
                )));
            }
            if profile.trading_hours.start >= profile.trading_hours.end {
                return Err(ConfigError::InvalidConfig(format!(
                    "asset '{}': trading hours start {} must precede end {}",
                    asset, profile.trading_hours.start, profile.trading_hours.end
                )));
            }
        }

        Ok(())
    }

    /// Names of enabled profiles, sorted for deterministic iteration
    pub fn enabled_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .strategy_profiles
            .iter()
            .filter(|(_, p)| p.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Names of enabled assets, sorted for deterministic iteration
    pub fn enabled_assets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .assets
            .iter()
            .filter(|(_, a)| a.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Market data store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_path: String,
    pub table_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            db_path: "market_data.db".to_string(),
            table_prefix: "rtd_data".to_string(),
        }
    }
}

/// Analysis parameters shared by all detectors plus per-method sub-sections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Seconds between scheduler invocations
    pub polling_interval: f64,
    /// Number of bars fetched per analysis cycle
    pub lookback_periods: usize,
    /// Seconds between chart renders (consumed by the chart collaborator, not here)
    pub chart_interval: u64,
    /// Minimum seconds between emitted signals for the same asset and profile
    pub signal_interval: u64,
    pub wyckoff: WyckoffConfig,
    pub order_flow: OrderFlowConfig,
    pub momentum: MomentumConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            polling_interval: 10.0,
            lookback_periods: 100,
            chart_interval: 300,
            signal_interval: 300,
            wyckoff: WyckoffConfig::default(),
            order_flow: OrderFlowConfig::default(),
            momentum: MomentumConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WyckoffConfig {
    pub enabled: bool,
    pub accumulation_threshold: f64,
    pub distribution_threshold: f64,
}

impl Default for WyckoffConfig {
    fn default() -> Self {
        WyckoffConfig {
            enabled: true,
            accumulation_threshold: 0.6,
            distribution_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderFlowConfig {
    pub enabled: bool,
    pub aggression_threshold: f64,
    pub absorption_threshold: f64,
    pub exhaustion_threshold: f64,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        OrderFlowConfig {
            enabled: true,
            aggression_threshold: 1.5,
            absorption_threshold: 2.0,
            exhaustion_threshold: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub enabled: bool,
    pub fast_period: usize,
    pub slow_period: usize,
    /// Bias threshold in volatility-normalized units
    pub signal_threshold: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        MomentumConfig {
            enabled: true,
            fast_period: 5,
            slow_period: 20,
            signal_threshold: 0.5,
        }
    }
}

/// Fusion gating parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub min_confidence: f64,
    pub confirmation_required: bool,
    pub risk_reward_min: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            min_confidence: 0.6,
            confirmation_required: true,
            risk_reward_min: 1.2,
        }
    }
}

/// Static per-instrument parameters, loaded once and referenced by the policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetProfile {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Monetary value of one price point
    pub point_value: f64,
    /// Minimum price increment
    pub tick_size: f64,
    pub trading_hours: TradingHours,
}

/// Trading session window in exchange-local time, half-open `[start, end)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TradingHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// "%H:%M" serde for session times ("09:00", "17:55")
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// MT5 bridge configuration (file-based signal handoff)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Mt5ExecutorConfig {
    pub enabled: bool,
    pub signal_file: String,
}

impl Default for Mt5ExecutorConfig {
    fn default() -> Self {
        Mt5ExecutorConfig {
            enabled: true,
            signal_file: "trading_signals.json".to_string(),
        }
    }
}

// =============================================================================
// Strategy profiles: partial overrides merged over the globals
// =============================================================================

/// A named bundle of threshold overrides. Every field is optional so the
/// merge touches only the keys the profile actually specifies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyProfile {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<SignalOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisOverrides>,
}

impl StrategyProfile {
    fn apply(&self, effective: &mut EffectiveConfig) {
        if let Some(signals) = &self.signals {
            signals.apply(&mut effective.signals);
        }
        if let Some(analysis) = &self.analysis {
            analysis.apply(&mut effective.analysis);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_reward_min: Option<f64>,
}

impl SignalOverrides {
    fn apply(&self, base: &mut SignalConfig) {
        if let Some(v) = self.min_confidence {
            base.min_confidence = v;
        }
        if let Some(v) = self.confirmation_required {
            base.confirmation_required = v;
        }
        if let Some(v) = self.risk_reward_min {
            base.risk_reward_min = v;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_periods: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wyckoff: Option<WyckoffOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_flow: Option<OrderFlowOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momentum: Option<MomentumOverrides>,
}

impl AnalysisOverrides {
    fn apply(&self, base: &mut AnalysisConfig) {
        if let Some(v) = self.lookback_periods {
            base.lookback_periods = v;
        }
        if let Some(v) = self.signal_interval {
            base.signal_interval = v;
        }
        if let Some(wyckoff) = &self.wyckoff {
            wyckoff.apply(&mut base.wyckoff);
        }
        if let Some(order_flow) = &self.order_flow {
            order_flow.apply(&mut base.order_flow);
        }
        if let Some(momentum) = &self.momentum {
            momentum.apply(&mut base.momentum);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WyckoffOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulation_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_threshold: Option<f64>,
}

impl WyckoffOverrides {
    fn apply(&self, base: &mut WyckoffConfig) {
        if let Some(v) = self.enabled {
            base.enabled = v;
        }
        if let Some(v) = self.accumulation_threshold {
            base.accumulation_threshold = v;
        }
        if let Some(v) = self.distribution_threshold {
            base.distribution_threshold = v;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFlowOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggression_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absorption_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhaustion_threshold: Option<f64>,
}

impl OrderFlowOverrides {
    fn apply(&self, base: &mut OrderFlowConfig) {
        if let Some(v) = self.enabled {
            base.enabled = v;
        }
        if let Some(v) = self.aggression_threshold {
            base.aggression_threshold = v;
        }
        if let Some(v) = self.absorption_threshold {
            base.absorption_threshold = v;
        }
        if let Some(v) = self.exhaustion_threshold {
            base.exhaustion_threshold = v;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MomentumOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_threshold: Option<f64>,
}

impl MomentumOverrides {
    fn apply(&self, base: &mut MomentumConfig) {
        if let Some(v) = self.enabled {
            base.enabled = v;
        }
        if let Some(v) = self.fast_period {
            base.fast_period = v;
        }
        if let Some(v) = self.slow_period {
            base.slow_period = v;
        }
        if let Some(v) = self.signal_threshold {
            base.signal_threshold = v;
        }
    }
}

// =============================================================================
// Effective configuration
// =============================================================================

/// The resolved, flattened parameter set for one analysis cycle.
///
/// Built once per cycle (or cached until the active profile changes) and
/// shared read-only across all concurrent detector tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub analysis: AnalysisConfig,
    pub signals: SignalConfig,
    /// The profile this view was resolved from, if any
    pub profile: Option<String>,
}

impl EffectiveConfig {
    fn validate_params(&self, scope: &str) -> Result<(), ConfigError> {
        let momentum = &self.analysis.momentum;
        if momentum.fast_period == 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "{}: momentum fast_period must be >= 1",
                scope
            )));
        }
        if momentum.fast_period >= momentum.slow_period {
            return Err(ConfigError::InvalidConfig(format!(
                "{}: momentum fast_period ({}) must be < slow_period ({})",
                scope, momentum.fast_period, momentum.slow_period
            )));
        }

        let wyckoff = &self.analysis.wyckoff;
        for (name, value) in [
            ("wyckoff accumulation_threshold", wyckoff.accumulation_threshold),
            ("wyckoff distribution_threshold", wyckoff.distribution_threshold),
            ("signals min_confidence", self.signals.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidConfig(format!(
                    "{}: {} must be within [0,1], got {}",
                    scope, name, value
                )));
            }
        }

        if self.signals.risk_reward_min <= 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "{}: signals risk_reward_min must be positive, got {}",
                scope, self.signals.risk_reward_min
            )));
        }

        if self.analysis.lookback_periods == 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "{}: analysis lookback_periods must be >= 1",
                scope
            )));
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_assets() -> HashMap<String, AssetProfile> {
    let session = TradingHours {
        start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
        end: NaiveTime::from_hms_opt(17, 55, 0).unwrap_or_default(),
    };
    HashMap::from([
        (
            "winfut".to_string(),
            AssetProfile {
                enabled: true,
                point_value: 0.2,
                tick_size: 5.0,
                trading_hours: session,
            },
        ),
        (
            "wdofut".to_string(),
            AssetProfile {
                enabled: true,
                point_value: 10.0,
                tick_size: 0.5,
                trading_hours: session,
            },
        ),
    ])
}

fn default_profiles() -> HashMap<String, StrategyProfile> {
    HashMap::from([
        (
            "conservador".to_string(),
            StrategyProfile {
                enabled: true,
                signals: Some(SignalOverrides {
                    min_confidence: Some(0.75),
                    confirmation_required: Some(true),
                    risk_reward_min: Some(1.8),
                }),
                analysis: Some(AnalysisOverrides {
                    wyckoff: Some(WyckoffOverrides {
                        accumulation_threshold: Some(0.7),
                        distribution_threshold: Some(0.7),
                        ..Default::default()
                    }),
                    order_flow: Some(OrderFlowOverrides {
                        aggression_threshold: Some(2.0),
                        absorption_threshold: Some(2.5),
                        exhaustion_threshold: Some(3.5),
                        ..Default::default()
                    }),
                    momentum: Some(MomentumOverrides {
                        signal_threshold: Some(0.7),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
        ),
        (
            "moderado".to_string(),
            StrategyProfile {
                enabled: true,
                signals: Some(SignalOverrides {
                    min_confidence: Some(0.6),
                    confirmation_required: Some(true),
                    risk_reward_min: Some(1.5),
                }),
                analysis: Some(AnalysisOverrides {
                    order_flow: Some(OrderFlowOverrides {
                        aggression_threshold: Some(1.5),
                        absorption_threshold: Some(2.0),
                        exhaustion_threshold: Some(3.0),
                        ..Default::default()
                    }),
                    momentum: Some(MomentumOverrides {
                        signal_threshold: Some(0.5),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
        ),
        (
            "agressivo".to_string(),
            StrategyProfile {
                enabled: true,
                signals: Some(SignalOverrides {
                    min_confidence: Some(0.5),
                    confirmation_required: Some(false),
                    risk_reward_min: Some(1.2),
                }),
                analysis: Some(AnalysisOverrides {
                    wyckoff: Some(WyckoffOverrides {
                        accumulation_threshold: Some(0.5),
                        distribution_threshold: Some(0.5),
                        ..Default::default()
                    }),
                    order_flow: Some(OrderFlowOverrides {
                        aggression_threshold: Some(1.2),
                        absorption_threshold: Some(1.5),
                        exhaustion_threshold: Some(2.5),
                        ..Default::default()
                    }),
                    momentum: Some(MomentumOverrides {
                        signal_threshold: Some(0.4),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
        ),
    ])
}
