// =============================================================================
// Signal Lifecycle Engine — per-symbol IDLE / OPEN state machine
// =============================================================================
//
// Life-cycle:
//   IDLE  ->  OPEN                 (all entry gates pass)
//   OPEN  ->  OPEN                 (price fell another 1%: new entry rung)
//   OPEN  ->  IDLE                 (price reached the fixed target)
//
// Entry gates, checked in order:
//   1. signal window open at the evaluation instant
//   2. 4h MACD > 0
//   3. 4h RSI > 55
//   4. 15m RSI < 45
//   5. 1m RSI < 30
//   6. 6h MACD bullish crossover (strict strategy only)
//   7. no open notification for the symbol in the last 30 minutes
//
// The engine never talks to the outside world: every transition returns a
// `SignalIntent` that the evaluation driver turns into notifications and log
// rows.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::lifecycle::store::{OpenSignal, SignalStore};
use crate::reference_tracker::pct_change;
use crate::types::{ChannelHandle, IndicatorSnapshot};

// =============================================================================
// StrategyConfig
// =============================================================================

fn default_require_long_crossover() -> bool {
    true
}

fn default_target_premium() -> f64 {
    0.023
}

fn default_rsi_long_min() -> f64 {
    55.0
}

fn default_rsi_mid_max() -> f64 {
    45.0
}

fn default_rsi_short_max() -> f64 {
    30.0
}

fn default_ladder_step() -> f64 {
    0.99
}

fn default_max_entries() -> Option<usize> {
    Some(10)
}

fn default_throttle_minutes() -> i64 {
    30
}

/// Tunable parameters of the entry/exit rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Gate entries on a confirmed 6h MACD bullish crossover.
    #[serde(default = "default_require_long_crossover")]
    pub require_long_crossover: bool,

    /// Target = first entry * (1 + premium).  0.023 means +2.3 %.
    #[serde(default = "default_target_premium")]
    pub target_premium: f64,

    /// 4h RSI must be strictly above this.
    #[serde(default = "default_rsi_long_min")]
    pub rsi_long_min: f64,

    /// 15m RSI must be strictly below this.
    #[serde(default = "default_rsi_mid_max")]
    pub rsi_mid_max: f64,

    /// 1m RSI must be strictly below this.
    #[serde(default = "default_rsi_short_max")]
    pub rsi_short_max: f64,

    /// A new rung needs price <= latest entry * ladder_step.
    #[serde(default = "default_ladder_step")]
    pub ladder_step: f64,

    /// Maximum number of entry rungs per signal; `null` means unbounded.
    #[serde(default = "default_max_entries")]
    pub max_entries: Option<usize>,

    /// Minimum minutes between two open notifications for one symbol.
    #[serde(default = "default_throttle_minutes")]
    pub throttle_minutes: i64,
}

impl StrategyConfig {
    /// Plain gating, +1.2 % target.
    pub fn plain() -> Self {
        Self {
            require_long_crossover: false,
            target_premium: 0.012,
            ..Self::strict()
        }
    }

    /// 6h-crossover gated, +2.3 % target.
    pub fn strict() -> Self {
        Self {
            require_long_crossover: default_require_long_crossover(),
            target_premium: default_target_premium(),
            rsi_long_min: default_rsi_long_min(),
            rsi_mid_max: default_rsi_mid_max(),
            rsi_short_max: default_rsi_short_max(),
            ladder_step: default_ladder_step(),
            max_entries: default_max_entries(),
            throttle_minutes: default_throttle_minutes(),
        }
    }

    /// Look up a named preset (`plain` or `strict`, case-insensitive).
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "plain" => Some(Self::plain()),
            "strict" => Some(Self::strict()),
            _ => None,
        }
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::minutes(self.throttle_minutes)
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::strict()
    }
}

// =============================================================================
// Intents
// =============================================================================

/// Notification for a freshly opened signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenNotice {
    pub signal_id: String,
    pub symbol: String,
    pub entry_price: f64,
    pub target_price: f64,
    pub indicators: IndicatorSnapshot,
    pub reference_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
}

/// Notification edit after a new entry rung.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LadderNotice {
    pub signal_id: String,
    pub symbol: String,
    /// Newest first.
    pub entries: Vec<f64>,
    pub target_price: f64,
    pub handles: Vec<ChannelHandle>,
}

/// Final summary of a signal that reached its target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseSummary {
    pub signal_id: String,
    pub symbol: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// Newest first.
    pub entries: Vec<f64>,
    pub target_price: f64,
    pub exit_price: f64,
    pub bottom_price: f64,
    pub held_secs: i64,
    pub drawdown_pct: f64,
    pub reference_price_at_open: Option<f64>,
    pub reference_price_at_close: Option<f64>,
    pub reference_change_pct: Option<f64>,
    pub crossover_confirmed_at_open: bool,
    pub indicators_at_open: IndicatorSnapshot,
    pub handles: Vec<ChannelHandle>,
}

impl CloseSummary {
    /// Held duration as `Hh Mm Ss`.
    pub fn held(&self) -> String {
        format_held(self.held_secs)
    }
}

/// Side effect requested by a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SignalIntent {
    Open(OpenNotice),
    Ladder(LadderNotice),
    Close(CloseSummary),
}

/// Render a duration in seconds as `Hh Mm Ss`.
pub fn format_held(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

// =============================================================================
// Engine
// =============================================================================

/// Why an idle symbol did not open this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryBlock {
    OutsideWindow,
    MacdLong,
    RsiLong,
    RsiMid,
    RsiShort,
    NoLongCrossover,
    Throttled,
}

impl std::fmt::Display for EntryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OutsideWindow => "outside signal window",
            Self::MacdLong => "4h MACD not positive",
            Self::RsiLong => "4h RSI too low",
            Self::RsiMid => "15m RSI too high",
            Self::RsiShort => "1m RSI too high",
            Self::NoLongCrossover => "no 6h MACD crossover",
            Self::Throttled => "notified within throttle window",
        };
        f.write_str(s)
    }
}

/// Stateless rule set; all state lives in the [`SignalStore`].
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    config: StrategyConfig,
}

impl SignalEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// First entry gate that fails for an idle symbol, or `None` if every
    /// gate passes.
    pub fn entry_block(
        &self,
        store: &SignalStore,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        in_window: bool,
        now: DateTime<Utc>,
    ) -> Option<EntryBlock> {
        let cfg = &self.config;
        if !in_window {
            Some(EntryBlock::OutsideWindow)
        } else if !(snapshot.macd_long > 0.0) {
            Some(EntryBlock::MacdLong)
        } else if !(snapshot.rsi_long > cfg.rsi_long_min) {
            Some(EntryBlock::RsiLong)
        } else if !(snapshot.rsi_mid < cfg.rsi_mid_max) {
            Some(EntryBlock::RsiMid)
        } else if !(snapshot.rsi_short < cfg.rsi_short_max) {
            Some(EntryBlock::RsiShort)
        } else if cfg.require_long_crossover && !snapshot.macd_crossover_long {
            Some(EntryBlock::NoLongCrossover)
        } else if store.is_throttled(symbol, now, cfg.throttle_window()) {
            Some(EntryBlock::Throttled)
        } else {
            None
        }
    }

    /// Run one evaluation for `symbol`.
    ///
    /// Idle symbols are checked against the entry gates; open symbols track
    /// the bottom, close on target, or add an entry rung.
    pub fn evaluate(
        &self,
        store: &mut SignalStore,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        in_window: bool,
        reference_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<SignalIntent> {
        let price = snapshot.current_price;
        if !(price > 0.0) {
            debug!(symbol, price, "invalid price — skipping lifecycle evaluation");
            return None;
        }

        if store.is_open(symbol) {
            if let Some(summary) = self.close_if_target(store, symbol, price, reference_price, now)
            {
                return Some(SignalIntent::Close(summary));
            }
            return self.ladder(store, symbol, price).map(SignalIntent::Ladder);
        }

        if let Some(block) = self.entry_block(store, symbol, snapshot, in_window, now) {
            debug!(symbol, reason = %block, "entry blocked");
            return None;
        }

        Some(SignalIntent::Open(self.open(
            store,
            symbol,
            snapshot,
            reference_price,
            now,
        )))
    }

    /// Target check between evaluations: track the bottom and close the
    /// signal when `price` reached the target.
    pub fn check_target(
        &self,
        store: &mut SignalStore,
        symbol: &str,
        price: f64,
        reference_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<CloseSummary> {
        if !(price > 0.0) {
            return None;
        }
        self.close_if_target(store, symbol, price, reference_price, now)
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn open(
        &self,
        store: &mut SignalStore,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        reference_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> OpenNotice {
        let entry = snapshot.current_price;
        let target = entry * (1.0 + self.config.target_premium);
        let id = Uuid::new_v4().to_string();

        store.mark_notified(symbol, now);
        store.insert(OpenSignal {
            id: id.clone(),
            symbol: symbol.to_string(),
            entry_prices: vec![entry],
            target_sell_price: target,
            handles: Vec::new(),
            opened_at: now,
            reference_price_at_open: reference_price,
            crossover_confirmed_at_open: snapshot.macd_crossover_long,
            bottom_price: entry,
            indicators_at_open: *snapshot,
        });

        info!(
            symbol,
            signal_id = %id,
            entry,
            target,
            rsi_long = format!("{:.2}", snapshot.rsi_long),
            rsi_mid = format!("{:.2}", snapshot.rsi_mid),
            rsi_short = format!("{:.2}", snapshot.rsi_short),
            crossover = snapshot.macd_crossover_long,
            "BUY SIGNAL opened"
        );

        OpenNotice {
            signal_id: id,
            symbol: symbol.to_string(),
            entry_price: entry,
            target_price: target,
            indicators: *snapshot,
            reference_price,
            opened_at: now,
        }
    }

    fn ladder(&self, store: &mut SignalStore, symbol: &str, price: f64) -> Option<LadderNotice> {
        let signal = store.get_mut(symbol)?;
        signal.observe(price);

        if price >= signal.target_sell_price {
            return None;
        }
        let qualifies = match signal.latest_entry() {
            None => true,
            Some(latest) => price < latest && price <= latest * self.config.ladder_step,
        };
        if !qualifies {
            return None;
        }
        if let Some(cap) = self.config.max_entries {
            if signal.entry_prices.len() >= cap {
                debug!(symbol, price, cap, "ladder depth cap reached — rung ignored");
                return None;
            }
        }

        signal.entry_prices.insert(0, price);
        info!(
            symbol,
            signal_id = %signal.id,
            price,
            rungs = signal.entry_prices.len(),
            target = signal.target_sell_price,
            "entry rung added"
        );

        Some(LadderNotice {
            signal_id: signal.id.clone(),
            symbol: symbol.to_string(),
            entries: signal.entry_prices.clone(),
            target_price: signal.target_sell_price,
            handles: signal.handles.clone(),
        })
    }

    fn close_if_target(
        &self,
        store: &mut SignalStore,
        symbol: &str,
        price: f64,
        reference_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<CloseSummary> {
        let signal = store.get_mut(symbol)?;
        signal.observe(price);
        if price < signal.target_sell_price {
            return None;
        }

        let signal = store.remove(symbol)?;
        let drawdown_pct = signal.drawdown_pct();
        let held_secs = (now - signal.opened_at).num_seconds();
        let reference_change_pct = match (signal.reference_price_at_open, reference_price) {
            (Some(open), Some(close)) => pct_change(open, close),
            _ => None,
        };

        info!(
            symbol,
            signal_id = %signal.id,
            exit_price = price,
            target = signal.target_sell_price,
            rungs = signal.entry_prices.len(),
            held = %format_held(held_secs),
            drawdown_pct = format!("{:.2}", drawdown_pct),
            "TARGET ACHIEVED — signal closed"
        );

        Some(CloseSummary {
            signal_id: signal.id,
            symbol: signal.symbol,
            opened_at: signal.opened_at,
            closed_at: now,
            entries: signal.entry_prices,
            target_price: signal.target_sell_price,
            exit_price: price,
            bottom_price: signal.bottom_price,
            held_secs,
            drawdown_pct,
            reference_price_at_open: signal.reference_price_at_open,
            reference_price_at_close: reference_price,
            reference_change_pct,
            crossover_confirmed_at_open: signal.crossover_confirmed_at_open,
            indicators_at_open: signal.indicators_at_open,
            handles: signal.handles,
        })
    }
}
