//! Single-cycle analyze command

use anyhow::Result;
use market_structure::data::SqliteMarketData;
use market_structure::engine::AnalysisEngine;
use market_structure::sink::SignalSink;
use market_structure::{Config, Symbol, Verdict};
use std::sync::Arc;
use tracing::info;

pub fn run(config_path: String, instrument: String, profile: Option<String>) -> Result<()> {
    info!("Starting single-cycle analysis");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let data = Arc::new(SqliteMarketData::open(&config.database)?);
    let sink = config
        .mt5_executor
        .enabled
        .then(|| SignalSink::new(&config.mt5_executor.signal_file));

    let engine = AnalysisEngine::new(config, data, sink);

    let runtime = tokio::runtime::Runtime::new()?;
    let signal = runtime.block_on(engine.analyze(&Symbol::new(&instrument), profile.as_deref()))?;

    match &signal.verdict {
        Verdict::Accepted => info!(
            "{}: {:?} @ confidence {:.2}, risk/reward {:.2}",
            instrument, signal.direction, signal.confidence, signal.risk_reward
        ),
        Verdict::Rejected(reason) => info!("{}: no signal ({:?})", instrument, reason),
    }

    println!("{}", serde_json::to_string_pretty(&signal)?);
    Ok(())
}
