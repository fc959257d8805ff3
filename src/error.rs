// =============================================================================
// Signal errors — the failure taxonomy shared by every port
// =============================================================================
//
// None of these are fatal: a failed fetch skips one symbol for one cycle, a
// failed notification is logged (and, for open/close notices, retried on the
// next cycle).

use crate::types::CandleInterval;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalError {
    /// Transport or parse failure while fetching candles or a price.
    DataUnavailable { symbol: String, reason: String },
    /// Fewer candles than an indicator requires.
    InsufficientHistory {
        symbol: String,
        interval: CandleInterval,
        indicator: &'static str,
        have: usize,
    },
    /// The messaging service rejected or never received a message.
    NotificationDelivery(String),
}

impl SignalError {
    pub fn unavailable(symbol: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable tag for logs and the status API.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::NotificationDelivery(_) => "notification_delivery",
        }
    }

    /// Whether the error means "no usable data for this symbol this cycle".
    pub fn is_data_gap(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. } | Self::InsufficientHistory { .. }
        )
    }
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataUnavailable { symbol, reason } => {
                write!(f, "data_unavailable: {symbol}: {reason}")
            }
            Self::InsufficientHistory {
                symbol,
                interval,
                indicator,
                have,
            } => write!(
                f,
                "insufficient_history: {symbol}@{interval}: {indicator} not computable from {have} closes"
            ),
            Self::NotificationDelivery(msg) => write!(f, "notification_delivery: {msg}"),
        }
    }
}

impl std::error::Error for SignalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_gaps_are_classified() {
        let e = SignalError::unavailable("ETHUSDT", "timeout");
        assert!(e.is_data_gap());
        assert_eq!(e.to_string(), "data_unavailable: ETHUSDT: timeout");

        let e = SignalError::InsufficientHistory {
            symbol: "ETHUSDT".into(),
            interval: CandleInterval::SixHours,
            indicator: "MACD",
            have: 12,
        };
        assert!(e.is_data_gap());
        assert_eq!(e.code(), "insufficient_history");
        assert!(e.to_string().contains("ETHUSDT@6h"));

        let e = SignalError::NotificationDelivery("chat not found".into());
        assert!(!e.is_data_gap());
    }
}
