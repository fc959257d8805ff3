// =============================================================================
// Binance REST API Client — public market-data endpoints
// =============================================================================
//
// Only unsigned endpoints are used: candle closes from `/api/v3/klines` and
// spot prices from `/api/v3/ticker/price`.  Every response feeds the request
// weight tracker; when the tracker says the minute budget is spent the call
// fails fast instead of risking a 429 / IP ban.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::binance::rate_limit::{RateLimitTracker, KLINES_WEIGHT, TICKER_PRICE_WEIGHT};
use crate::error::SignalError;
use crate::ports::MarketDataPort;
use crate::types::CandleInterval;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance public REST client.
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: RateLimitTracker,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a client for `base_url` whose requests give up after
    /// `timeout_secs`.
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit: RateLimitTracker::new(),
        })
    }

    pub fn rate_limit(&self) -> &RateLimitTracker {
        &self.rate_limit
    }

    fn current_minute() -> i64 {
        Utc::now().timestamp() / 60
    }

    /// GET `url`, record the weight header, and return the JSON body.
    async fn get_json(&self, url: &str, weight: u32, what: &str) -> Result<serde_json::Value> {
        if !self
            .rate_limit
            .can_send_request(weight, Self::current_minute())
        {
            anyhow::bail!("request weight budget exhausted for this minute");
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {what} request failed"))?;

        self.rate_limit
            .update_from_headers(resp.headers(), Self::current_minute());

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {what} response"))?;

        if !status.is_success() {
            anyhow::bail!("Binance GET {what} returned {status}: {body}");
        }
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines — closing prices, oldest first.
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, ...
    #[instrument(skip(self), name = "binance::get_closes")]
    pub async fn get_closes(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> Result<Vec<f64>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval.as_str(),
            limit
        );
        let body = self.get_json(&url, KLINES_WEIGHT, "/api/v3/klines").await?;
        let closes = parse_kline_closes(&body)?;

        debug!(symbol, %interval, count = closes.len(), "klines fetched");
        Ok(closes)
    }

    /// GET /api/v3/ticker/price — latest price for one symbol.
    #[instrument(skip(self), name = "binance::get_ticker_price")]
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let body = self
            .get_json(&url, TICKER_PRICE_WEIGHT, "/api/v3/ticker/price")
            .await?;
        let price = parse_str_f64(&body["price"]).context("ticker response missing 'price'")?;

        debug!(symbol, price, "ticker price fetched");
        Ok(price)
    }
}

#[async_trait]
impl MarketDataPort for BinanceClient {
    async fn fetch_close_series(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> Result<Vec<f64>, SignalError> {
        self.get_closes(symbol, interval, limit)
            .await
            .map_err(|e| SignalError::unavailable(symbol, format!("{interval} klines: {e:#}")))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, SignalError> {
        self.get_ticker_price(symbol)
            .await
            .map_err(|e| SignalError::unavailable(symbol, format!("ticker price: {e:#}")))
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// -------------------------------------------------------------------------
// Response parsing
// -------------------------------------------------------------------------

/// Extract the close column from Binance's array-of-arrays kline payload.
/// Malformed rows are skipped with a warning.
fn parse_kline_closes(body: &serde_json::Value) -> Result<Vec<f64>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut closes = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;
        if arr.len() < 7 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }
        closes.push(parse_str_f64(&arr[4])?);
    }
    Ok(closes)
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}
