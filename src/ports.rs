// =============================================================================
// Ports — the engine's view of the outside world
// =============================================================================
//
//   MarketDataPort    candle closes and spot prices (Binance REST)
//   NotificationPort  create / edit chat messages (Telegram)
//   LogPort           append-only evaluation and trade records (CSV)
//
// Production implementations live in `binance`, `notify` and `trade_log`;
// tests plug in in-memory fakes.
// =============================================================================

use async_trait::async_trait;

use crate::error::SignalError;
use crate::trade_log::{EvaluationRecord, TradeRecord};
use crate::types::{CandleInterval, ChannelHandle};

#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Closing prices, oldest first, of the most recent `limit` candles.
    async fn fetch_close_series(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> Result<Vec<f64>, SignalError>;

    /// Latest traded price.
    async fn fetch_price(&self, symbol: &str) -> Result<f64, SignalError>;
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Post `text` to every channel; returns one handle per channel that
    /// accepted the message.  Fails only when no channel accepted it.
    async fn create_message(
        &self,
        channel_ids: &[String],
        text: &str,
    ) -> Result<Vec<ChannelHandle>, SignalError>;

    /// Replace the text of previously created messages.  Fails when any
    /// handle could not be updated.
    async fn update_message(&self, handles: &[ChannelHandle], text: &str)
        -> Result<(), SignalError>;
}

pub trait LogPort: Send + Sync {
    fn append_evaluation(&self, record: &EvaluationRecord) -> anyhow::Result<()>;
    fn append_trade(&self, record: &TradeRecord) -> anyhow::Result<()>;
}
