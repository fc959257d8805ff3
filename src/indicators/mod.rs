// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the signal
// engine.  Scalar functions return `Option<T>` so callers are forced to
// handle insufficient-data and numerical-edge-case scenarios.

pub mod ema;
pub mod macd;
pub mod rsi;

pub use macd::{compute_full_macd, compute_macd};
pub use rsi::compute_rsi;
