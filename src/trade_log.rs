// =============================================================================
// Trade & Evaluation Logs — append-only CSV
// =============================================================================
//
// Two files live in the configured log directory:
//   evaluations_v1.csv   one row per symbol per evaluation cycle
//   trades_v1.csv        one row per signal that reached its target
//
// Every row starts with `schema_version`.  Column order is fixed by the
// struct field order below; changing it means bumping `SCHEMA_VERSION`,
// which also changes the file names so old and new layouts never mix.
//
// Writes are blocking file I/O; async callers run them on the blocking pool.
// =============================================================================

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::lifecycle::CloseSummary;
use crate::ports::LogPort;
use crate::reference_tracker::ReferenceMomentum;
use crate::types::IndicatorSnapshot;

pub const SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Records
// =============================================================================

/// One symbol's indicator snapshot in one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub rsi_long: f64,
    pub rsi_mid: f64,
    pub rsi_short: f64,
    pub macd_long: f64,
    pub macd_crossover_long: bool,
    pub current_price: f64,
    pub reference_price: Option<f64>,
    pub reference_change_instant_pct: Option<f64>,
    pub reference_change_30m_pct: Option<f64>,
}

impl EvaluationRecord {
    pub fn new(
        symbol: &str,
        at: DateTime<Utc>,
        snapshot: &IndicatorSnapshot,
        reference: &ReferenceMomentum,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            timestamp: at,
            symbol: symbol.to_string(),
            rsi_long: snapshot.rsi_long,
            rsi_mid: snapshot.rsi_mid,
            rsi_short: snapshot.rsi_short,
            macd_long: snapshot.macd_long,
            macd_crossover_long: snapshot.macd_crossover_long,
            current_price: snapshot.current_price,
            reference_price: reference.price,
            reference_change_instant_pct: reference.change_instant_pct,
            reference_change_30m_pct: reference.change_30m_pct,
        }
    }
}

/// A completed signal. Indicator columns repeat the values captured when the
/// signal opened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub schema_version: u32,
    pub signal_id: String,
    pub symbol: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub first_entry_price: f64,
    pub last_entry_price: f64,
    pub entry_count: usize,
    pub target_price: f64,
    pub exit_price: f64,
    pub bottom_price: f64,
    pub held_secs: i64,
    pub held: String,
    pub drawdown_pct: f64,
    pub reference_price_at_open: Option<f64>,
    pub reference_price_at_close: Option<f64>,
    pub reference_change_pct: Option<f64>,
    pub crossover_confirmed_at_open: bool,
    pub rsi_long_at_open: f64,
    pub rsi_mid_at_open: f64,
    pub rsi_short_at_open: f64,
    pub macd_long_at_open: f64,
}

impl From<&CloseSummary> for TradeRecord {
    fn from(s: &CloseSummary) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            signal_id: s.signal_id.clone(),
            symbol: s.symbol.clone(),
            opened_at: s.opened_at,
            closed_at: s.closed_at,
            first_entry_price: s.entries.last().copied().unwrap_or(0.0),
            last_entry_price: s.entries.first().copied().unwrap_or(0.0),
            entry_count: s.entries.len(),
            target_price: s.target_price,
            exit_price: s.exit_price,
            bottom_price: s.bottom_price,
            held_secs: s.held_secs,
            held: s.held(),
            drawdown_pct: (s.drawdown_pct * 100.0).round() / 100.0,
            reference_price_at_open: s.reference_price_at_open,
            reference_price_at_close: s.reference_price_at_close,
            reference_change_pct: s.reference_change_pct,
            crossover_confirmed_at_open: s.crossover_confirmed_at_open,
            rsi_long_at_open: s.indicators_at_open.rsi_long,
            rsi_mid_at_open: s.indicators_at_open.rsi_mid,
            rsi_short_at_open: s.indicators_at_open.rsi_short,
            macd_long_at_open: s.indicators_at_open.macd_long,
        }
    }
}

// =============================================================================
// CSV log
// =============================================================================

/// File-backed [`LogPort`]. Writes are serialized through a mutex so rows
/// from concurrently evaluated symbols never interleave.
pub struct CsvSignalLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvSignalLog {
    /// Create the log directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn evaluations_path(&self) -> PathBuf {
        self.dir.join(format!("evaluations_v{SCHEMA_VERSION}.csv"))
    }

    pub fn trades_path(&self) -> PathBuf {
        self.dir.join(format!("trades_v{SCHEMA_VERSION}.csv"))
    }

    fn append<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        let _guard = self.write_lock.lock();

        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        wtr.serialize(record)
            .with_context(|| format!("failed to write row to {}", path.display()))?;
        wtr.flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;

        debug!(path = %path.display(), "log row appended");
        Ok(())
    }
}

impl LogPort for CsvSignalLog {
    fn append_evaluation(&self, record: &EvaluationRecord) -> Result<()> {
        self.append(&self.evaluations_path(), record)
    }

    fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        self.append(&self.trades_path(), record)
    }
}
