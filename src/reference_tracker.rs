// =============================================================================
// Reference Asset Tracker — rolling price history for market momentum
// =============================================================================
//
// Keeps a time-ordered history of reference-asset prices (BTC by default)
// covering the last 31 minutes.  Every evaluation appends the freshest price
// and trims expired samples from the front, so eviction is always a prefix
// trim.
//
// The tracker is shared by every symbol's evaluation; callers wrap it in a
// `parking_lot::Mutex` so appends and trims are serialized.
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// How long samples are retained.
pub const RETENTION_MINUTES: i64 = 31;
/// Look-back used for the windowed momentum figure.
pub const MOMENTUM_WINDOW_MINUTES: i64 = 30;

/// A single reference price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferenceSample {
    pub price: f64,
    pub at: DateTime<Utc>,
}

/// Momentum view of the reference asset at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReferenceMomentum {
    pub price: Option<f64>,
    /// % change vs. the previous sample.
    pub change_instant_pct: Option<f64>,
    /// % change vs. the sample from ~30 minutes ago.
    pub change_30m_pct: Option<f64>,
}

/// Bounded, time-ordered price history for one reference symbol.
#[derive(Debug, Clone)]
pub struct ReferenceTracker {
    symbol: String,
    history: VecDeque<ReferenceSample>,
    retention: Duration,
}

impl ReferenceTracker {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            history: VecDeque::new(),
            retention: Duration::minutes(RETENTION_MINUTES),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Append `price` observed at `at`, then drop every sample older than the
    /// retention window relative to `at`.
    pub fn record(&mut self, price: f64, at: DateTime<Utc>) {
        self.history.push_back(ReferenceSample { price, at });

        let cutoff = at - self.retention;
        while self.history.front().is_some_and(|s| s.at < cutoff) {
            self.history.pop_front();
        }
    }

    /// Most recent recorded price.
    pub fn latest_price(&self) -> Option<f64> {
        self.history.back().map(|s| s.price)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// % change of the latest sample vs. the one recorded just before it.
    pub fn instantaneous_change(&self) -> Option<f64> {
        let n = self.history.len();
        if n < 2 {
            return None;
        }
        pct_change(self.history[n - 2].price, self.history[n - 1].price)
    }

    /// % change of the latest sample vs. the first retained sample recorded
    /// at or before `now - window`.  `None` until the history is that long.
    pub fn change_over_window(&self, window: Duration, now: DateTime<Utc>) -> Option<f64> {
        let current = self.history.back()?;
        let cutoff = now - window;
        let past = self.history.iter().find(|s| s.at <= cutoff)?;
        pct_change(past.price, current.price)
    }

    /// Instantaneous and 30-minute momentum at `now`.
    pub fn momentum(&self, now: DateTime<Utc>) -> ReferenceMomentum {
        ReferenceMomentum {
            price: self.latest_price(),
            change_instant_pct: self.instantaneous_change(),
            change_30m_pct: self
                .change_over_window(Duration::minutes(MOMENTUM_WINDOW_MINUTES), now),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &ReferenceSample> {
        self.history.iter()
    }
}

/// Percentage change from `from` to `to`, rounded to 2 decimals.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || !from.is_finite() || !to.is_finite() {
        return None;
    }
    Some(round2((to - from) / from * 100.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
