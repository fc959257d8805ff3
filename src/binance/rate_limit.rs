// =============================================================================
// Request-Weight Tracker — keeps market-data polling under Binance's limit
// =============================================================================
//
// Binance allows 1200 request weight per minute per IP; we hard-cap ourselves
// at 1000.  The tracker reads the `X-MBX-USED-WEIGHT-1M` response header after
// every request.  The header value only describes the minute it was issued
// in, so it is treated as zero once the wall-clock minute rolls over.
// =============================================================================

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use tracing::{debug, warn};

/// Hard ceiling at which we refuse to send additional requests.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

/// Weight of `GET /api/v3/klines` for limit <= 100.
pub const KLINES_WEIGHT: u32 = 2;
/// Weight of `GET /api/v3/ticker/price` for one symbol.
pub const TICKER_PRICE_WEIGHT: u32 = 2;

/// Thread-safe tracker backed by atomics.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    /// Unix minute the weight value belongs to.
    minute: AtomicI64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub hard_limit: u32,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            minute: AtomicI64::new(0),
        }
    }

    /// Update the weight counter from Binance response headers.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap, now_minute: i64) {
        let Some(weight) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };
        self.record_weight(weight, now_minute);
    }

    pub fn record_weight(&self, weight: u32, now_minute: i64) {
        self.minute.store(now_minute, Ordering::Relaxed);
        let prev = self.used_weight_1m.swap(weight, Ordering::Relaxed);
        if weight >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "rate-limit weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = weight, "rate-limit weight updated from header");
    }

    /// Weight used in `now_minute` as far as we know.
    pub fn used_weight(&self, now_minute: i64) -> u32 {
        if self.minute.load(Ordering::Relaxed) == now_minute {
            self.used_weight_1m.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Return `true` if we can afford to spend `weight` more request weight
    /// without exceeding the hard limit.
    pub fn can_send_request(&self, weight: u32, now_minute: i64) -> bool {
        let current = self.used_weight(now_minute);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked — would exceed rate-limit"
            );
        }
        allowed
    }

    pub fn snapshot(&self, now_minute: i64) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.used_weight(now_minute),
            hard_limit: WEIGHT_HARD_LIMIT,
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .field("minute", &self.minute.load(Ordering::Relaxed))
            .finish()
    }
}
