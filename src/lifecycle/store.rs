// =============================================================================
// Signal Store — per-symbol lifecycle state
// =============================================================================
//
// Owns everything the lifecycle engine mutates:
//   - open signals (at most one per symbol)
//   - the notification throttle (symbol -> last open notification)
//   - open/close notices whose delivery failed and await a retry
//
// The store itself is plain data; the evaluation driver wraps it in a
// `parking_lot::Mutex` and never holds the lock across an `.await`.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::types::{ChannelHandle, IndicatorSnapshot};

/// Delivery attempts allowed for an open/close notice before it is dropped.
pub const MAX_NOTICE_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// OpenSignal
// ---------------------------------------------------------------------------

/// An active buy signal for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct OpenSignal {
    pub id: String,
    pub symbol: String,
    /// Entry rungs, newest (lowest) first.
    pub entry_prices: Vec<f64>,
    /// Fixed at creation.
    pub target_sell_price: f64,
    /// One message per channel that accepted the open notification.
    pub handles: Vec<ChannelHandle>,
    pub opened_at: DateTime<Utc>,
    pub reference_price_at_open: Option<f64>,
    pub crossover_confirmed_at_open: bool,
    /// Lowest price observed since the signal opened.
    pub bottom_price: f64,
    pub indicators_at_open: IndicatorSnapshot,
}

impl OpenSignal {
    /// Most recent entry rung.
    pub fn latest_entry(&self) -> Option<f64> {
        self.entry_prices.first().copied()
    }

    /// The entry the signal opened with.
    pub fn first_entry(&self) -> Option<f64> {
        self.entry_prices.last().copied()
    }

    /// Fold a newly observed price into the bottom tracker.
    pub fn observe(&mut self, price: f64) {
        if price < self.bottom_price {
            self.bottom_price = price;
        }
    }

    /// `(latest_entry - bottom) / latest_entry * 100`.
    pub fn drawdown_pct(&self) -> f64 {
        match self.latest_entry() {
            Some(entry) if entry > 0.0 => (entry - self.bottom_price) / entry * 100.0,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Pending notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeKind {
    Open,
    Close,
}

/// A lifecycle-critical message that could not be delivered.
#[derive(Debug, Clone, Serialize)]
pub struct PendingNotice {
    pub signal_id: String,
    pub symbol: String,
    pub kind: NoticeKind,
    pub text: String,
    /// Messages to edit; empty means "post a new message".
    pub handles: Vec<ChannelHandle>,
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// SignalStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SignalStore {
    open: HashMap<String, OpenSignal>,
    throttle: HashMap<String, DateTime<Utc>>,
    pending: Vec<PendingNotice>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Open signals ────────────────────────────────────────────────────

    pub fn is_open(&self, symbol: &str) -> bool {
        self.open.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&OpenSignal> {
        self.open.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut OpenSignal> {
        self.open.get_mut(symbol)
    }

    /// Insert a new open signal.  Returns `false` (and leaves the existing
    /// signal untouched) if the symbol already has one.
    pub fn insert(&mut self, signal: OpenSignal) -> bool {
        if self.open.contains_key(&signal.symbol) {
            return false;
        }
        self.open.insert(signal.symbol.clone(), signal);
        true
    }

    pub fn remove(&mut self, symbol: &str) -> Option<OpenSignal> {
        self.open.remove(symbol)
    }

    /// Store the message handles returned for a signal's open notification.
    /// Ignored when the signal is gone or `signal_id` no longer matches.
    pub fn attach_handles(&mut self, symbol: &str, signal_id: &str, handles: Vec<ChannelHandle>) {
        if let Some(signal) = self.open.get_mut(symbol) {
            if signal.id == signal_id {
                signal.handles.extend(handles);
            }
        }
    }

    /// Snapshot of all open signals, sorted by symbol.
    pub fn open_signals(&self) -> Vec<OpenSignal> {
        let mut signals: Vec<OpenSignal> = self.open.values().cloned().collect();
        signals.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        signals
    }

    pub fn open_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.open.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    // ── Throttle ────────────────────────────────────────────────────────

    /// Whether `symbol` was notified less than `window` before `now`.
    pub fn is_throttled(&self, symbol: &str, now: DateTime<Utc>, window: Duration) -> bool {
        self.throttle
            .get(symbol)
            .is_some_and(|&last| now - last < window)
    }

    pub fn mark_notified(&mut self, symbol: &str, at: DateTime<Utc>) {
        self.throttle.insert(symbol.to_string(), at);
    }

    #[cfg(test)]
    pub fn last_notified(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.throttle.get(symbol).copied()
    }

    // ── Pending notices ─────────────────────────────────────────────────

    pub fn queue_notice(&mut self, notice: PendingNotice) {
        self.pending.push(notice);
    }

    /// Remove and return every pending notice.
    pub fn take_pending(&mut self) -> Vec<PendingNotice> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi_long: 60.0,
            rsi_mid: 40.0,
            rsi_short: 25.0,
            macd_long: 1.0,
            macd_crossover_long: true,
            current_price: price,
        }
    }

    fn signal(symbol: &str, entry: f64) -> OpenSignal {
        OpenSignal {
            id: "sig-1".into(),
            symbol: symbol.into(),
            entry_prices: vec![entry],
            target_sell_price: entry * 1.012,
            handles: Vec::new(),
            opened_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap(),
            reference_price_at_open: None,
            crossover_confirmed_at_open: false,
            bottom_price: entry,
            indicators_at_open: snapshot(entry),
        }
    }

    #[test]
    fn at_most_one_signal_per_symbol() {
        let mut store = SignalStore::new();
        assert!(store.insert(signal("ETHUSDT", 100.0)));
        assert!(!store.insert(signal("ETHUSDT", 50.0)));
        assert_eq!(store.get("ETHUSDT").unwrap().entry_prices, vec![100.0]);
    }

    #[test]
    fn throttle_window() {
        let mut store = SignalStore::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        store.mark_notified("ETHUSDT", t);
        let w = Duration::minutes(30);
        assert!(store.is_throttled("ETHUSDT", t + Duration::minutes(29), w));
        assert!(!store.is_throttled("ETHUSDT", t + Duration::minutes(30), w));
        assert!(!store.is_throttled("BNBUSDT", t, w));
    }

    #[test]
    fn bottom_only_moves_down() {
        let mut s = signal("ETHUSDT", 100.0);
        s.observe(97.0);
        s.observe(99.0);
        assert_eq!(s.bottom_price, 97.0);
        assert!((s.drawdown_pct() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn handles_attach_only_to_matching_signal() {
        let mut store = SignalStore::new();
        store.insert(signal("ETHUSDT", 100.0));
        let h = ChannelHandle {
            channel_id: "-100".into(),
            message_id: 7,
        };
        store.attach_handles("ETHUSDT", "other", vec![h.clone()]);
        assert!(store.get("ETHUSDT").unwrap().handles.is_empty());
        store.attach_handles("ETHUSDT", "sig-1", vec![h.clone()]);
        assert_eq!(store.get("ETHUSDT").unwrap().handles, vec![h]);
    }

    #[test]
    fn pending_notices_drain() {
        let mut store = SignalStore::new();
        store.queue_notice(PendingNotice {
            signal_id: "sig-1".into(),
            symbol: "ETHUSDT".into(),
            kind: NoticeKind::Close,
            text: "closed".into(),
            handles: Vec::new(),
            attempts: 1,
        });
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.take_pending().len(), 1);
        assert_eq!(store.pending_count(), 0);
    }
}
