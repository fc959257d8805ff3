// =============================================================================
// Central Application State
// =============================================================================
//
// Ties together the pieces of state that both scheduler loops and the status
// API touch:
//   - the signal store (open signals, throttle, pending notices)
//   - the shared reference-asset tracker
//   - a ring buffer of recent errors
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::Mutex for the signal store and reference tracker, whose
//     updates must be serialized.
//   - parking_lot::RwLock for the read-mostly error log.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::lifecycle::{OpenSignal, SignalStore};
use crate::reference_tracker::{ReferenceMomentum, ReferenceTracker};
use crate::runtime_config::RuntimeConfig;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Machine-readable error code (see `SignalError::code`).
    pub code: Option<String>,
    pub symbol: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// AppState
// =============================================================================

/// Shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Incremented on every meaningful state mutation.
    pub state_version: AtomicU64,

    pub config: RuntimeConfig,

    pub store: Mutex<SignalStore>,
    pub reference: Mutex<ReferenceTracker>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Instant when the engine was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

/// Serialisable view of the state for `GET /api/v1/state`.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub symbols: Vec<String>,
    pub reference_symbol: String,
    pub open_signals: Vec<OpenSignal>,
    pub pending_notices: usize,
    pub reference: ReferenceMomentum,
    pub recent_errors: Vec<ErrorRecord>,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        let reference = ReferenceTracker::new(config.reference_symbol.clone());
        Self {
            state_version: AtomicU64::new(1),
            config,
            store: Mutex::new(SignalStore::new()),
            reference: Mutex::new(reference),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Log ───────────────────────────────────────────────────────

    /// Record an error. The ring buffer is capped at [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, message: String, code: Option<&str>, symbol: Option<&str>) {
        let record = ErrorRecord {
            message,
            code: code.map(str::to_string),
            symbol: symbol.map(str::to_string),
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn open_signals(&self) -> Vec<OpenSignal> {
        self.store.lock().open_signals()
    }

    pub fn reference_momentum(&self) -> ReferenceMomentum {
        self.reference.lock().momentum(Utc::now())
    }

    pub fn build_snapshot(&self) -> StateSnapshot {
        let (open_signals, pending_notices) = {
            let store = self.store.lock();
            (store.open_signals(), store.pending_count())
        };

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            symbols: self.config.symbols.clone(),
            reference_symbol: self.config.reference_symbol.clone(),
            open_signals,
            pending_notices,
            reference: self.reference_momentum(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}
