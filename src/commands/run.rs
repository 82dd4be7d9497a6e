//! Continuous analysis loop
//!
//! Every polling tick, each enabled asset is analyzed under each selected
//! profile. Accepted signals are throttled per (asset, profile) pair by the
//! profile's `signal_interval`; a cycle failure for one pair is logged and
//! the loop moves on.

use anyhow::Result;
use market_structure::data::SqliteMarketData;
use market_structure::engine::AnalysisEngine;
use market_structure::sink::SignalSink;
use market_structure::{Config, Symbol};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub fn run(config_path: String, profile: Option<String>) -> Result<()> {
    info!("Starting continuous analysis loop");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    // Selected profiles, resolved once so a bad name fails before the loop.
    // Each carries its own effective signal_interval.
    let profiles: Vec<(Option<String>, u64)> = match &profile {
        Some(name) => {
            let effective = config.resolve(Some(name))?;
            vec![(Some(name.clone()), effective.analysis.signal_interval)]
        }
        None => {
            let enabled = config.enabled_profiles();
            if enabled.is_empty() {
                vec![(None, config.analysis.signal_interval)]
            } else {
                enabled
                    .into_iter()
                    .map(|name| {
                        let effective = config.resolve(Some(&name))?;
                        Ok((Some(name), effective.analysis.signal_interval))
                    })
                    .collect::<Result<_>>()?
            }
        }
    };

    let assets = config.enabled_assets();
    if assets.is_empty() {
        anyhow::bail!("no enabled assets in configuration");
    }
    info!(
        "Analyzing {} asset(s) under {} profile(s)",
        assets.len(),
        profiles.len()
    );

    let polling_interval = Duration::from_secs_f64(config.analysis.polling_interval);

    let data = Arc::new(SqliteMarketData::open(&config.database)?);
    let sink = config
        .mt5_executor
        .enabled
        .then(|| SignalSink::new(&config.mt5_executor.signal_file));
    let engine = AnalysisEngine::new(config, data, sink);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_loop(engine, assets, profiles, polling_interval))
}

async fn run_loop(
    engine: AnalysisEngine,
    assets: Vec<String>,
    profiles: Vec<(Option<String>, u64)>,
    polling_interval: Duration,
) -> Result<()> {
    // Last accepted-signal time per (asset, profile)
    let mut last_emitted: HashMap<(String, String), Instant> = HashMap::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping analysis loop");
                return Ok(());
            }
            _ = tokio::time::sleep(polling_interval) => {}
        }

        for asset in &assets {
            let instrument = Symbol::new(asset);
            for (profile, signal_interval) in &profiles {
                let key = (asset.clone(), profile.clone().unwrap_or_default());

                if let Some(emitted) = last_emitted.get(&key) {
                    if emitted.elapsed() < Duration::from_secs(*signal_interval) {
                        debug!(
                            instrument = %instrument,
                            profile = ?profile,
                            "signal interval not elapsed, skipping"
                        );
                        continue;
                    }
                }

                match engine.analyze(&instrument, profile.as_deref()).await {
                    Ok(signal) if signal.verdict.is_accepted() => {
                        last_emitted.insert(key, Instant::now());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(
                            instrument = %instrument,
                            profile = ?profile,
                            error = %e,
                            "analysis cycle failed"
                        );
                    }
                }
            }
        }
    }
}
