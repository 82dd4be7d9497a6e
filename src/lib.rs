//! Market Structure Analyzer
//!
//! Multi-method market-structure analysis for futures instruments: Wyckoff
//! phase detection, order-flow analysis, and momentum, fused into a single
//! confidence- and risk/reward-gated trading signal. Named strategy profiles
//! override the global thresholds per run, and accepted signals are handed
//! off through a JSON signal file.

pub mod config;
pub mod data;
pub mod detectors;
pub mod engine;
pub mod fusion;
pub mod indicators;
pub mod levels;
pub mod policy;
pub mod sink;
pub mod types;

pub use config::Config;
pub use types::*;
