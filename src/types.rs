// =============================================================================
// Shared types used across the signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Candle intervals the evaluation pulls from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    OneMinute,
    FifteenMinutes,
    FourHours,
    SixHours,
}

impl CandleInterval {
    /// Exchange notation (`1m`, `15m`, `4h`, `6h`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FifteenMinutes => "15m",
            Self::FourHours => "4h",
            Self::SixHours => "6h",
        }
    }
}

impl std::fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indicator values for one symbol in one evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// RSI(14) on 4h closes.
    pub rsi_long: f64,
    /// RSI(14) on 15m closes.
    pub rsi_mid: f64,
    /// RSI(14) on 1m closes.
    pub rsi_short: f64,
    /// MACD(12, 26) on 4h closes.
    pub macd_long: f64,
    /// Bullish MACD/signal crossover on 6h closes.
    pub macd_crossover_long: bool,
    /// Last 1m close.
    pub current_price: f64,
}

/// A message posted to one notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub channel_id: String,
    pub message_id: i64,
}
