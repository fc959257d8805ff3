// =============================================================================
// Signal Lifecycle — per-symbol buy signal state machine and its store
// =============================================================================

pub mod engine;
pub mod store;

pub use engine::{CloseSummary, LadderNotice, OpenNotice, SignalEngine, SignalIntent, StrategyConfig};
pub use store::{NoticeKind, OpenSignal, PendingNotice, SignalStore, MAX_NOTICE_ATTEMPTS};
