//! Signal file output
//!
//! One JSON object mapping instrument name to its latest accepted signal.
//! The executor side polls this file, so every rewrite goes through a temp
//! file plus rename; the reader never observes a half-written document.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::Signal;

pub struct SignalSink {
    path: PathBuf,
}

impl SignalSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        SignalSink {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Merge `signal` into the file under its instrument name, keeping the
    /// latest entry for every other instrument.
    pub fn record(&self, signal: &Signal) -> Result<()> {
        let mut signals = self.load()?;
        signals.insert(signal.instrument.to_string(), signal.clone());

        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&signals)?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("failed to write signal file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace signal file: {}", self.path.display()))?;

        debug!(
            instrument = %signal.instrument,
            path = %self.path.display(),
            "signal recorded"
        );
        Ok(())
    }

    /// The current instrument-to-signal map; empty when the file is absent
    pub fn load(&self) -> Result<BTreeMap<String, Signal>> {
        match std::fs::read_to_string(&self.path) {
            Ok(body) => serde_json::from_str(&body)
                .with_context(|| format!("corrupt signal file: {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| {
                format!("failed to read signal file: {}", self.path.display())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Symbol, Verdict};
    use chrono::Utc;

    fn signal_for(instrument: &str, confidence: f64) -> Signal {
        Signal {
            instrument: Symbol::new(instrument),
            timestamp: Utc::now(),
            direction: Direction::Long,
            confidence,
            risk_reward: 2.0,
            levels: None,
            scores: vec![],
            verdict: Verdict::Accepted,
            profile: Some("moderado".to_string()),
        }
    }

    #[test]
    fn test_record_and_reload() {
        let dir = std::env::temp_dir().join(format!("sink_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sink = SignalSink::new(dir.join("signals.json"));

        sink.record(&signal_for("winfut", 0.7)).unwrap();
        sink.record(&signal_for("wdofut", 0.8)).unwrap();
        // Latest entry per instrument wins
        sink.record(&signal_for("winfut", 0.9)).unwrap();

        let signals = sink.load().unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals["winfut"].confidence, 0.9);
        assert_eq!(signals["wdofut"].confidence, 0.8);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let sink = SignalSink::new("/nonexistent/dir/signals.json");
        assert!(sink.load().unwrap().is_empty());
    }
}
