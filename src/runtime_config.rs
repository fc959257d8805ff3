// =============================================================================
// Runtime Configuration — signal engine settings with atomic save
// =============================================================================
//
// Every tunable parameter of the signal bot lives here: the tracked symbols,
// the reference asset, notification channels, strategy thresholds, loop
// intervals and candle window sizes.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::lifecycle::StrategyConfig;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
        "ADAUSDT".to_string(),
        "DOGEUSDT".to_string(),
    ]
}

fn default_reference_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_target_check_interval_secs() -> u64 {
    20
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_long_candle_limit() -> u32 {
    100
}

fn default_rsi_candle_limit() -> u32 {
    30
}

fn default_crossover_lookback() -> usize {
    crate::indicators::macd::DEFAULT_CROSSOVER_LOOKBACK
}

fn default_exchange_base_url() -> String {
    crate::binance::client::DEFAULT_BASE_URL.to_string()
}

fn default_telegram_api_url() -> String {
    crate::notify::telegram::DEFAULT_API_URL.to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Symbols -------------------------------------------------------------

    /// Symbols evaluated every cycle.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Asset whose momentum is tracked alongside every signal.
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: String,

    // --- Notifications -------------------------------------------------------

    /// Telegram chat ids that receive every signal message.
    #[serde(default)]
    pub channel_ids: Vec<String>,

    /// Bot token.  Normally supplied through `TELEGRAM_BOT_TOKEN`.
    #[serde(default, skip_serializing)]
    pub telegram_bot_token: String,

    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,

    // --- Strategy ------------------------------------------------------------

    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Look-back (in paired samples) for the 6h crossover heuristic.
    #[serde(default = "default_crossover_lookback")]
    pub crossover_lookback: usize,

    // --- Scheduling ----------------------------------------------------------

    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,

    #[serde(default = "default_target_check_interval_secs")]
    pub target_check_interval_secs: u64,

    /// Upper bound on any single exchange / Telegram request.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    // --- Candle windows ------------------------------------------------------

    /// Candles fetched for 4h and 6h series (MACD needs >= 35).
    #[serde(default = "default_long_candle_limit")]
    pub long_candle_limit: u32,

    /// Candles fetched for 15m and 1m series (RSI(14) needs >= 15).
    #[serde(default = "default_rsi_candle_limit")]
    pub rsi_candle_limit: u32,

    // --- Infrastructure ------------------------------------------------------

    #[serde(default = "default_exchange_base_url")]
    pub exchange_base_url: String,

    /// Directory for the CSV evaluation / trade logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Status API listen address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            reference_symbol: default_reference_symbol(),
            channel_ids: Vec::new(),
            telegram_bot_token: String::new(),
            telegram_api_url: default_telegram_api_url(),
            strategy: StrategyConfig::default(),
            crossover_lookback: default_crossover_lookback(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
            target_check_interval_secs: default_target_check_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            long_candle_limit: default_long_candle_limit(),
            rsi_candle_limit: default_rsi_candle_limit(),
            exchange_base_url: default_exchange_base_url(),
            log_dir: default_log_dir(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// Split a comma-separated env value into trimmed, non-empty items.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            reference = %config.reference_symbol,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply environment overrides.  `lookup` is `std::env::var` in
    /// production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SIGNAL_SYMBOLS") {
            let symbols: Vec<String> = split_list(&raw)
                .into_iter()
                .map(|s| s.to_uppercase())
                .collect();
            if !symbols.is_empty() {
                self.symbols = symbols;
            }
        }
        if let Some(raw) = lookup("SIGNAL_CHANNELS") {
            self.channel_ids = split_list(&raw);
        }
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = token.trim().to_string();
        }
        if let Some(addr) = lookup("SIGNAL_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(dir) = lookup("SIGNAL_LOG_DIR") {
            self.log_dir = dir;
        }
        if let Some(name) = lookup("SIGNAL_STRATEGY") {
            match StrategyConfig::preset(&name) {
                Some(strategy) => self.strategy = strategy,
                None => warn!(preset = %name, "unknown SIGNAL_STRATEGY, keeping configured strategy"),
            }
        }
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).  The bot token is never written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
