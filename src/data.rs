//! Market data access
//!
//! Bars come out of the SQLite database the collector process writes, one
//! table per instrument. Reads are the most recent `lookback` rows, returned
//! in ascending time order. An in-memory implementation backs the tests.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::types::{MarketBar, Symbol};

/// Read access to per-instrument bar history
pub trait MarketData: Send + Sync {
    /// The most recent `lookback` bars in ascending time order. Fewer rows
    /// than requested is not an error; the detectors abstain on their own.
    fn fetch(&self, instrument: &Symbol, lookback: usize) -> Result<Vec<MarketBar>>;
}

pub struct SqliteMarketData {
    conn: Mutex<Connection>,
    table_prefix: String,
}

impl SqliteMarketData {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = Path::new(&config.db_path);
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database: {}", path.display()))?;

        info!(db_path = %path.display(), "market database opened");

        Ok(SqliteMarketData {
            conn: Mutex::new(conn),
            table_prefix: config.table_prefix.clone(),
        })
    }

    /// Wrap an already-open connection. Used by tests with `:memory:`.
    pub fn from_connection(conn: Connection, table_prefix: impl Into<String>) -> Self {
        SqliteMarketData {
            conn: Mutex::new(conn),
            table_prefix: table_prefix.into(),
        }
    }

    fn table_name(&self, instrument: &Symbol) -> String {
        // Table names cannot be bound as parameters; restrict to a safe
        // identifier charset instead.
        let safe: String = instrument
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        format!("{}_{}", self.table_prefix, safe.to_lowercase())
    }
}

impl MarketData for SqliteMarketData {
    fn fetch(&self, instrument: &Symbol, lookback: usize) -> Result<Vec<MarketBar>> {
        let conn = self.conn.lock().unwrap();
        let table = self.table_name(instrument);

        let query = format!(
            "SELECT timestamp, open, high, low, close, volume, buy_volume, sell_volume
             FROM {table}
             ORDER BY timestamp DESC
             LIMIT ?1"
        );

        let mut stmt = conn
            .prepare(&query)
            .with_context(|| format!("no bar table for instrument {instrument}"))?;

        let mut bars = stmt
            .query_map([lookback], |row| {
                Ok(RawBar {
                    timestamp: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                    buy_volume: row.get(6)?,
                    sell_volume: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(RawBar::into_bar)
            .collect::<Result<Vec<_>>>()?;

        // The query returns newest-first; the detectors want oldest-first.
        bars.reverse();

        debug!(instrument = %instrument, rows = bars.len(), "fetched bars");
        Ok(bars)
    }
}

struct RawBar {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    buy_volume: Option<f64>,
    sell_volume: Option<f64>,
}

impl RawBar {
    fn into_bar(self) -> Result<MarketBar> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        Ok(MarketBar {
            timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            buy_volume: self.buy_volume,
            sell_volume: self.sell_volume,
        })
    }
}

/// The collector writes RFC 3339; older tables carry bare local timestamps.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("failed to parse timestamp: {raw}"))
}

/// Fixed bar histories keyed by instrument, for tests and dry runs
pub struct MemoryMarketData {
    bars: HashMap<Symbol, Vec<MarketBar>>,
}

impl MemoryMarketData {
    pub fn new() -> Self {
        MemoryMarketData {
            bars: HashMap::new(),
        }
    }

    pub fn insert(&mut self, instrument: Symbol, bars: Vec<MarketBar>) {
        self.bars.insert(instrument, bars);
    }
}

impl Default for MemoryMarketData {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketData for MemoryMarketData {
    fn fetch(&self, instrument: &Symbol, lookback: usize) -> Result<Vec<MarketBar>> {
        let bars = self
            .bars
            .get(instrument)
            .with_context(|| format!("no data loaded for instrument {instrument}"))?;
        let start = bars.len().saturating_sub(lookback);
        Ok(bars[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn seeded_connection(table: &str, rows: usize) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            &format!(
                "CREATE TABLE {table} (
                    timestamp TEXT PRIMARY KEY,
                    open REAL, high REAL, low REAL, close REAL,
                    volume REAL, buy_volume REAL, sell_volume REAL
                )"
            ),
            [],
        )
        .unwrap();

        let start = Utc.with_ymd_and_hms(2025, 5, 23, 10, 0, 0).unwrap();
        for i in 0..rows {
            let ts = start + Duration::minutes(5 * i as i64);
            conn.execute(
                &format!(
                    "INSERT INTO {table} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                rusqlite::params![
                    ts.to_rfc3339(),
                    100.0 + i as f64,
                    101.0 + i as f64,
                    99.0 + i as f64,
                    100.5 + i as f64,
                    1000.0,
                    600.0,
                    400.0,
                ],
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn test_fetch_returns_ascending_window() {
        let conn = seeded_connection("rtd_data_winfut", 30);
        let data = SqliteMarketData::from_connection(conn, "rtd_data");
        let bars = data.fetch(&Symbol::new("winfut"), 10).unwrap();

        assert_eq!(bars.len(), 10);
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        // Newest 10 of 30 rows: closes 120.5 through 129.5
        assert_eq!(bars[0].close, 120.5);
        assert_eq!(bars[9].close, 129.5);
    }

    #[test]
    fn test_fetch_short_table_returns_all_rows() {
        let conn = seeded_connection("rtd_data_winfut", 3);
        let data = SqliteMarketData::from_connection(conn, "rtd_data");
        let bars = data.fetch(&Symbol::new("winfut"), 100).unwrap();
        assert_eq!(bars.len(), 3);
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        let data = SqliteMarketData::from_connection(conn, "rtd_data");
        assert!(data.fetch(&Symbol::new("wdofut"), 10).is_err());
    }

    #[test]
    fn test_table_name_sanitized() {
        let conn = Connection::open_in_memory().unwrap();
        let data = SqliteMarketData::from_connection(conn, "rtd_data");
        assert_eq!(
            data.table_name(&Symbol::new("win$fut; DROP TABLE x")),
            "rtd_data_winfutdroptablex"
        );
    }

    #[test]
    fn test_parse_legacy_timestamp() {
        let parsed = parse_timestamp("2025-05-23 10:30:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 5, 23, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_memory_data_window() {
        let start = Utc.with_ymd_and_hms(2025, 5, 23, 10, 0, 0).unwrap();
        let bars: Vec<MarketBar> = (0..20)
            .map(|i| MarketBar {
                timestamp: start + Duration::minutes(i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1000.0,
                buy_volume: None,
                sell_volume: None,
            })
            .collect();

        let mut data = MemoryMarketData::new();
        data.insert(Symbol::new("winfut"), bars);

        assert_eq!(data.fetch(&Symbol::new("winfut"), 5).unwrap().len(), 5);
        assert_eq!(data.fetch(&Symbol::new("winfut"), 50).unwrap().len(), 20);
        assert!(data.fetch(&Symbol::new("wdofut"), 5).is_err());
    }
}
