// =============================================================================
// Evaluation Driver — one scheduling tick across every tracked symbol
// =============================================================================
//
// Per symbol, every evaluation cycle:
//   1. fetch 4h / 15m / 1m / 6h closes and the reference price concurrently
//   2. record the reference price and derive its momentum
//   3. build the indicator snapshot (missing data skips the symbol)
//   4. append an evaluation row
//   5. run the lifecycle engine and dispatch the resulting intent
//
// Target checks run on their own, faster loop and only touch symbols that
// have an open signal.
//
// Store and tracker locks are taken in short synchronous blocks and are
// never held across an `.await`.
// =============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use crate::app_state::AppState;
use crate::error::SignalError;
use crate::indicators::{compute_full_macd, compute_macd, compute_rsi};
use crate::lifecycle::{
    CloseSummary, LadderNotice, NoticeKind, OpenNotice, PendingNotice, SignalEngine,
    SignalIntent, MAX_NOTICE_ATTEMPTS,
};
use crate::notify::messages::{render_close, render_ladder, render_open};
use crate::ports::{LogPort, MarketDataPort, NotificationPort};
use crate::reference_tracker::ReferenceMomentum;
use crate::signal_window::is_signal_window;
use crate::trade_log::{EvaluationRecord, TradeRecord};
use crate::types::{CandleInterval, ChannelHandle, IndicatorSnapshot};

/// RSI look-back used on every timeframe.
pub const RSI_PERIOD: usize = 14;

/// Wall-clock source; tests substitute a fixed instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// =============================================================================
// Snapshot construction
// =============================================================================

/// Compute the indicator snapshot from the four close series.
///
/// Any indicator that cannot be computed yields `InsufficientHistory` for
/// the series that was too short.
pub fn build_snapshot(
    symbol: &str,
    closes_4h: &[f64],
    closes_15m: &[f64],
    closes_1m: &[f64],
    closes_6h: &[f64],
    crossover_lookback: usize,
) -> Result<IndicatorSnapshot, SignalError> {
    let missing = |interval: CandleInterval, indicator: &'static str, have: usize| {
        SignalError::InsufficientHistory {
            symbol: symbol.to_string(),
            interval,
            indicator,
            have,
        }
    };

    let rsi_long = compute_rsi(closes_4h, RSI_PERIOD)
        .ok_or_else(|| missing(CandleInterval::FourHours, "RSI", closes_4h.len()))?;
    let rsi_mid = compute_rsi(closes_15m, RSI_PERIOD)
        .ok_or_else(|| missing(CandleInterval::FifteenMinutes, "RSI", closes_15m.len()))?;
    let rsi_short = compute_rsi(closes_1m, RSI_PERIOD)
        .ok_or_else(|| missing(CandleInterval::OneMinute, "RSI", closes_1m.len()))?;
    let macd_long = compute_macd(closes_4h)
        .ok_or_else(|| missing(CandleInterval::FourHours, "MACD", closes_4h.len()))?;
    let full_6h = compute_full_macd(closes_6h)
        .ok_or_else(|| missing(CandleInterval::SixHours, "MACD signal", closes_6h.len()))?;
    let current_price = closes_1m
        .last()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| missing(CandleInterval::OneMinute, "price", closes_1m.len()))?;

    Ok(IndicatorSnapshot {
        rsi_long,
        rsi_mid,
        rsi_short,
        macd_long,
        macd_crossover_long: full_6h.bullish_crossover(crossover_lookback),
        current_price,
    })
}

/// Await `fut`, mapping an elapsed deadline to `DataUnavailable`.
async fn with_timeout<T, F>(symbol: &str, what: &str, secs: u64, fut: F) -> Result<T, SignalError>
where
    F: Future<Output = Result<T, SignalError>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(SignalError::unavailable(
            symbol,
            format!("{what} timed out after {secs}s"),
        )),
    }
}

// =============================================================================
// Driver
// =============================================================================

pub struct EvaluationDriver {
    market: Arc<dyn MarketDataPort>,
    notifier: Arc<dyn NotificationPort>,
    log: Arc<dyn LogPort>,
    engine: SignalEngine,
    state: Arc<AppState>,
    clock: Clock,
}

impl EvaluationDriver {
    pub fn new(
        market: Arc<dyn MarketDataPort>,
        notifier: Arc<dyn NotificationPort>,
        log: Arc<dyn LogPort>,
        state: Arc<AppState>,
    ) -> Self {
        let engine = SignalEngine::new(state.config.strategy.clone());
        Self {
            market,
            notifier,
            log,
            engine,
            state,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn timeout_secs(&self) -> u64 {
        self.state.config.fetch_timeout_secs
    }

    // -------------------------------------------------------------------------
    // Evaluation cycle
    // -------------------------------------------------------------------------

    /// Retry undelivered notices, then evaluate every configured symbol
    /// concurrently.  Per-symbol failures are logged and never abort the
    /// other symbols.
    pub async fn run_evaluation_cycle(&self) {
        self.retry_pending().await;

        let symbols = self.state.config.symbols.clone();
        let results = join_all(symbols.iter().map(|s| self.evaluate_symbol(s))).await;

        let mut skipped = 0usize;
        for (symbol, result) in symbols.iter().zip(results) {
            if let Err(e) = result {
                skipped += 1;
                if e.is_data_gap() {
                    warn!(symbol = %symbol, code = e.code(), error = %e, "symbol skipped this cycle");
                } else {
                    error!(symbol = %symbol, code = e.code(), error = %e, "symbol evaluation failed");
                }
                self.state
                    .push_error(e.to_string(), Some(e.code()), Some(symbol.as_str()));
            }
        }
        debug!(symbols = symbols.len(), skipped, "evaluation cycle complete");
    }

    /// Evaluate one symbol.  A data gap returns an error before any state is
    /// touched.
    #[instrument(skip(self))]
    pub async fn evaluate_symbol(&self, symbol: &str) -> Result<(), SignalError> {
        let cfg = &self.state.config;
        let secs = self.timeout_secs();
        let market = &self.market;

        let (c4h, c15m, c1m, c6h, reference) = tokio::join!(
            with_timeout(
                symbol,
                "4h closes",
                secs,
                market.fetch_close_series(symbol, CandleInterval::FourHours, cfg.long_candle_limit),
            ),
            with_timeout(
                symbol,
                "15m closes",
                secs,
                market.fetch_close_series(
                    symbol,
                    CandleInterval::FifteenMinutes,
                    cfg.rsi_candle_limit
                ),
            ),
            with_timeout(
                symbol,
                "1m closes",
                secs,
                market.fetch_close_series(symbol, CandleInterval::OneMinute, cfg.rsi_candle_limit),
            ),
            with_timeout(
                symbol,
                "6h closes",
                secs,
                market.fetch_close_series(symbol, CandleInterval::SixHours, cfg.long_candle_limit),
            ),
            with_timeout(
                &cfg.reference_symbol,
                "reference price",
                secs,
                market.fetch_price(&cfg.reference_symbol),
            ),
        );

        let now = self.now();
        let momentum = self.record_reference(reference, now);

        let snapshot = build_snapshot(
            symbol,
            &c4h?,
            &c15m?,
            &c1m?,
            &c6h?,
            cfg.crossover_lookback,
        )?;

        let record = EvaluationRecord::new(symbol, now, &snapshot, &momentum);
        self.write_log(symbol, "evaluation", move |log| log.append_evaluation(&record))
            .await;

        let in_window = is_signal_window(now);
        let intent = {
            let mut store = self.state.store.lock();
            self.engine
                .evaluate(&mut store, symbol, &snapshot, in_window, momentum.price, now)
        };

        if let Some(intent) = intent {
            self.state.increment_version();
            self.dispatch(intent).await;
        }
        Ok(())
    }

    /// Record a fetched reference price.  A failed fetch yields empty
    /// momentum rather than stale values.
    fn record_reference(
        &self,
        reference: Result<f64, SignalError>,
        now: DateTime<Utc>,
    ) -> ReferenceMomentum {
        match reference {
            Ok(price) => {
                let mut tracker = self.state.reference.lock();
                tracker.record(price, now);
                tracker.momentum(now)
            }
            Err(e) => {
                debug!(error = %e, "reference price unavailable");
                ReferenceMomentum::default()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Target check
    // -------------------------------------------------------------------------

    /// Check every open signal against its target.
    pub async fn run_target_check(&self) {
        let symbols = self.state.store.lock().open_symbols();
        if symbols.is_empty() {
            return;
        }
        join_all(symbols.iter().map(|s| self.check_symbol_target(s))).await;
    }

    async fn check_symbol_target(&self, symbol: &str) {
        let secs = self.timeout_secs();
        let reference_symbol = &self.state.config.reference_symbol;

        let (price, reference) = tokio::join!(
            with_timeout(symbol, "price", secs, self.market.fetch_price(symbol)),
            with_timeout(
                reference_symbol,
                "reference price",
                secs,
                self.market.fetch_price(reference_symbol),
            ),
        );

        let price = match price {
            Ok(p) => p,
            Err(e) => {
                debug!(symbol, error = %e, "target check skipped");
                return;
            }
        };

        let now = self.now();
        let momentum = self.record_reference(reference, now);

        let summary = {
            let mut store = self.state.store.lock();
            self.engine
                .check_target(&mut store, symbol, price, momentum.price, now)
        };

        if let Some(summary) = summary {
            self.state.increment_version();
            self.deliver_close(summary).await;
        }
    }

    // -------------------------------------------------------------------------
    // Intent dispatch
    // -------------------------------------------------------------------------

    async fn dispatch(&self, intent: SignalIntent) {
        match intent {
            SignalIntent::Open(notice) => self.deliver_open(notice).await,
            SignalIntent::Ladder(notice) => self.deliver_ladder(notice).await,
            SignalIntent::Close(summary) => self.deliver_close(summary).await,
        }
    }

    // Each request is bounded by the notifier's client timeout.  No outer
    // deadline: a create cancelled midway loses the handles already posted.
    async fn create(&self, text: &str) -> Result<Vec<ChannelHandle>, SignalError> {
        self.notifier
            .create_message(&self.state.config.channel_ids, text)
            .await
    }

    async fn update(&self, handles: &[ChannelHandle], text: &str) -> Result<(), SignalError> {
        self.notifier.update_message(handles, text).await
    }

    async fn deliver_open(&self, notice: OpenNotice) {
        let text = render_open(&notice);
        match self.create(&text).await {
            Ok(handles) => {
                info!(symbol = %notice.symbol, channels = handles.len(), "open notification sent");
                self.state
                    .store
                    .lock()
                    .attach_handles(&notice.symbol, &notice.signal_id, handles);
            }
            Err(e) => {
                self.delivery_failed(&notice.symbol, &e);
                self.state.store.lock().queue_notice(PendingNotice {
                    signal_id: notice.signal_id,
                    symbol: notice.symbol,
                    kind: NoticeKind::Open,
                    text,
                    handles: Vec::new(),
                    attempts: 1,
                });
            }
        }
    }

    async fn deliver_ladder(&self, notice: LadderNotice) {
        if notice.handles.is_empty() {
            debug!(symbol = %notice.symbol, "no message to edit — ladder update skipped");
            return;
        }
        let text = render_ladder(&notice);
        if let Err(e) = self.update(&notice.handles, &text).await {
            self.delivery_failed(&notice.symbol, &e);
        }
    }

    async fn deliver_close(&self, summary: CloseSummary) {
        let record = TradeRecord::from(&summary);
        self.write_log(&summary.symbol, "trade", move |log| log.append_trade(&record))
            .await;

        let text = render_close(&summary);
        let result = if summary.handles.is_empty() {
            self.create(&text).await.map(|_| ())
        } else {
            self.update(&summary.handles, &text).await
        };

        if let Err(e) = result {
            self.delivery_failed(&summary.symbol, &e);
            self.state.store.lock().queue_notice(PendingNotice {
                signal_id: summary.signal_id,
                symbol: summary.symbol,
                kind: NoticeKind::Close,
                text,
                handles: summary.handles,
                attempts: 1,
            });
        }
    }

    /// Run a blocking log write off the async workers.  Failures are logged
    /// and never affect signal state.
    async fn write_log<F>(&self, symbol: &str, what: &str, write: F)
    where
        F: FnOnce(&dyn LogPort) -> anyhow::Result<()> + Send + 'static,
    {
        let log = self.log.clone();
        match tokio::task::spawn_blocking(move || write(&*log)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(symbol, error = %format!("{e:#}"), "failed to append {what} row"),
            Err(e) => warn!(symbol, error = %e, "{what} log task failed"),
        }
    }

    fn delivery_failed(&self, symbol: &str, e: &SignalError) {
        warn!(symbol, error = %e, "notification delivery failed");
        self.state.push_error(e.to_string(), Some(e.code()), Some(symbol));
    }

    // -------------------------------------------------------------------------
    // Pending notices
    // -------------------------------------------------------------------------

    /// Re-send open/close notices that failed on an earlier cycle.  A notice
    /// is dropped after [`MAX_NOTICE_ATTEMPTS`] deliveries.
    pub async fn retry_pending(&self) {
        let pending = self.state.store.lock().take_pending();

        for mut notice in pending {
            if notice.kind == NoticeKind::Open {
                let still_unsent = self
                    .state
                    .store
                    .lock()
                    .get(&notice.symbol)
                    .is_some_and(|s| s.id == notice.signal_id && s.handles.is_empty());
                if !still_unsent {
                    debug!(symbol = %notice.symbol, "pending open notice is stale — dropped");
                    continue;
                }
            }

            let result = if notice.handles.is_empty() {
                self.create(&notice.text).await
            } else {
                self.update(&notice.handles, &notice.text)
                    .await
                    .map(|_| Vec::new())
            };

            match result {
                Ok(handles) => {
                    info!(symbol = %notice.symbol, kind = ?notice.kind, "pending notice delivered");
                    if notice.kind == NoticeKind::Open {
                        self.state.store.lock().attach_handles(
                            &notice.symbol,
                            &notice.signal_id,
                            handles,
                        );
                    }
                }
                Err(e) => {
                    notice.attempts += 1;
                    if notice.attempts < MAX_NOTICE_ATTEMPTS {
                        debug!(symbol = %notice.symbol, attempts = notice.attempts, "notice requeued");
                        self.state.store.lock().queue_notice(notice);
                    } else {
                        warn!(
                            symbol = %notice.symbol,
                            kind = ?notice.kind,
                            attempts = notice.attempts,
                            error = %e,
                            "notice dropped after repeated delivery failures"
                        );
                        self.state
                            .push_error(e.to_string(), Some(e.code()), Some(notice.symbol.as_str()));
                    }
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Scheduler loops
    // -------------------------------------------------------------------------

    pub async fn run_evaluation_loop(self: Arc<Self>) {
        let period = Duration::from_secs(self.state.config.evaluation_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        info!(every_secs = period.as_secs(), "evaluation loop starting");
        loop {
            interval.tick().await;
            self.run_evaluation_cycle().await;
        }
    }

    pub async fn run_target_loop(self: Arc<Self>) {
        let period = Duration::from_secs(self.state.config.target_check_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        info!(every_secs = period.as_secs(), "target-check loop starting");
        loop {
            interval.tick().await;
            self.run_target_check().await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::StrategyConfig;
    use crate::runtime_config::RuntimeConfig;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    // ---- Fakes -------------------------------------------------------------

    #[derive(Default)]
    struct FakeMarket {
        series: Mutex<HashMap<(String, CandleInterval), Vec<f64>>>,
        prices: Mutex<HashMap<String, f64>>,
    }

    impl FakeMarket {
        fn set_series(&self, symbol: &str, interval: CandleInterval, closes: Vec<f64>) {
            self.series
                .lock()
                .insert((symbol.to_string(), interval), closes);
        }

        fn set_price(&self, symbol: &str, price: f64) {
            self.prices.lock().insert(symbol.to_string(), price);
        }
    }

    #[async_trait]
    impl MarketDataPort for FakeMarket {
        async fn fetch_close_series(
            &self,
            symbol: &str,
            interval: CandleInterval,
            _limit: u32,
        ) -> Result<Vec<f64>, SignalError> {
            self.series
                .lock()
                .get(&(symbol.to_string(), interval))
                .cloned()
                .ok_or_else(|| SignalError::unavailable(symbol, "no data"))
        }

        async fn fetch_price(&self, symbol: &str) -> Result<f64, SignalError> {
            self.prices
                .lock()
                .get(symbol)
                .copied()
                .ok_or_else(|| SignalError::unavailable(symbol, "no price"))
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        fail: Mutex<bool>,
        per_channel_delay: Mutex<Option<Duration>>,
        next_id: Mutex<i64>,
        created: Mutex<Vec<String>>,
        updated: Mutex<Vec<(Vec<ChannelHandle>, String)>>,
    }

    impl FakeNotifier {
        fn set_failing(&self, fail: bool) {
            *self.fail.lock() = fail;
        }

        fn set_per_channel_delay(&self, delay: Duration) {
            *self.per_channel_delay.lock() = Some(delay);
        }
    }

    #[async_trait]
    impl NotificationPort for FakeNotifier {
        async fn create_message(
            &self,
            channel_ids: &[String],
            text: &str,
        ) -> Result<Vec<ChannelHandle>, SignalError> {
            if *self.fail.lock() {
                return Err(SignalError::NotificationDelivery("offline".into()));
            }
            let delay = *self.per_channel_delay.lock();
            if let Some(delay) = delay {
                for _ in channel_ids {
                    tokio::time::sleep(delay).await;
                }
            }
            self.created.lock().push(text.to_string());
            let mut next = self.next_id.lock();
            Ok(channel_ids
                .iter()
                .map(|c| {
                    *next += 1;
                    ChannelHandle {
                        channel_id: c.clone(),
                        message_id: *next,
                    }
                })
                .collect())
        }

        async fn update_message(
            &self,
            handles: &[ChannelHandle],
            text: &str,
        ) -> Result<(), SignalError> {
            if *self.fail.lock() {
                return Err(SignalError::NotificationDelivery("offline".into()));
            }
            self.updated
                .lock()
                .push((handles.to_vec(), text.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryLog {
        fail: Mutex<bool>,
        evaluations: Mutex<Vec<EvaluationRecord>>,
        trades: Mutex<Vec<TradeRecord>>,
    }

    impl LogPort for MemoryLog {
        fn append_evaluation(&self, record: &EvaluationRecord) -> anyhow::Result<()> {
            if *self.fail.lock() {
                anyhow::bail!("disk full");
            }
            self.evaluations.lock().push(record.clone());
            Ok(())
        }

        fn append_trade(&self, record: &TradeRecord) -> anyhow::Result<()> {
            self.trades.lock().push(record.clone());
            Ok(())
        }
    }

    // ---- Series fixtures ---------------------------------------------------

    /// Long uptrend with noise: RSI well above 55, MACD positive.
    fn rising(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + i as f64 + if i % 2 == 0 { 0.5 } else { 0.0 })
            .collect()
    }

    /// Steady decline ending at `last`: RSI(14) pinned to 0.
    fn falling_to(n: usize, last: f64) -> Vec<f64> {
        (0..n).map(|i| last + (n - 1 - i) as f64 * 0.1).collect()
    }

    const SYM: &str = "ETHUSDT";
    const REF: &str = "BTCUSDT";

    struct Harness {
        market: Arc<FakeMarket>,
        notifier: Arc<FakeNotifier>,
        log: Arc<MemoryLog>,
        state: Arc<AppState>,
        driver: EvaluationDriver,
    }

    fn in_window_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 0, 45, 0).unwrap()
    }

    fn harness(symbols: &[&str]) -> Harness {
        harness_with(RuntimeConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            channel_ids: vec!["-1001".into(), "-1002".into()],
            strategy: StrategyConfig::plain(),
            ..RuntimeConfig::default()
        })
    }

    fn harness_with(config: RuntimeConfig) -> Harness {
        let state = Arc::new(AppState::new(config));
        let market = Arc::new(FakeMarket::default());
        let notifier = Arc::new(FakeNotifier::default());
        let log = Arc::new(MemoryLog::default());
        let driver = EvaluationDriver::new(
            market.clone(),
            notifier.clone(),
            log.clone(),
            state.clone(),
        )
        .with_clock(Arc::new(in_window_instant));
        Harness {
            market,
            notifier,
            log,
            state,
            driver,
        }
    }

    fn seed_bullish(market: &FakeMarket, symbol: &str, price: f64) {
        market.set_series(symbol, CandleInterval::FourHours, rising(100));
        market.set_series(symbol, CandleInterval::SixHours, rising(100));
        market.set_series(symbol, CandleInterval::FifteenMinutes, falling_to(30, price));
        market.set_series(symbol, CandleInterval::OneMinute, falling_to(30, price));
        market.set_price(REF, 60_000.0);
    }

    // ---- build_snapshot ----------------------------------------------------

    #[test]
    fn snapshot_from_fixtures_passes_gates() {
        let snap = build_snapshot(
            SYM,
            &rising(100),
            &falling_to(30, 50.0),
            &falling_to(30, 50.0),
            &rising(100),
            5,
        )
        .unwrap();
        assert!(snap.rsi_long > 55.0);
        assert!(snap.macd_long > 0.0);
        assert_eq!(snap.rsi_mid, 0.0);
        assert_eq!(snap.rsi_short, 0.0);
        assert_eq!(snap.current_price, 50.0);
    }

    #[test]
    fn short_series_reports_insufficient_history() {
        let err = build_snapshot(
            SYM,
            &rising(100),
            &falling_to(30, 50.0),
            &falling_to(30, 50.0),
            &rising(20),
            5,
        )
        .unwrap_err();
        match err {
            SignalError::InsufficientHistory { interval, have, .. } => {
                assert_eq!(interval, CandleInterval::SixHours);
                assert_eq!(have, 20);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    // ---- Evaluation cycle --------------------------------------------------

    #[tokio::test]
    async fn opens_once_and_stores_handles() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);

        h.driver.run_evaluation_cycle().await;
        h.driver.run_evaluation_cycle().await;

        assert_eq!(h.notifier.created.lock().len(), 1);
        let signal = h.state.store.lock().get(SYM).cloned().unwrap();
        assert_eq!(signal.entry_prices, vec![50.0]);
        assert_eq!(signal.handles.len(), 2);
        assert_eq!(signal.reference_price_at_open, Some(60_000.0));
        assert_eq!(h.log.evaluations.lock().len(), 2);
    }

    #[tokio::test]
    async fn slow_multi_channel_create_is_not_cut_short() {
        // Two channels at 600ms each outlast the 1s per-request timeout in
        // total but not individually.
        let h = harness_with(RuntimeConfig {
            symbols: vec![SYM.to_string()],
            channel_ids: vec!["-1001".into(), "-1002".into()],
            strategy: StrategyConfig::plain(),
            fetch_timeout_secs: 1,
            ..RuntimeConfig::default()
        });
        seed_bullish(&h.market, SYM, 50.0);
        h.notifier
            .set_per_channel_delay(Duration::from_millis(600));

        h.driver.run_evaluation_cycle().await;

        let store = h.state.store.lock();
        assert_eq!(store.get(SYM).map(|s| s.handles.len()), Some(2));
        assert_eq!(store.pending_count(), 0);
        drop(store);
        assert_eq!(h.notifier.created.lock().len(), 1);
        assert!(h.state.recent_errors.read().is_empty());
    }

    #[tokio::test]
    async fn log_write_failure_does_not_block_the_signal() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        *h.log.fail.lock() = true;

        h.driver.run_evaluation_cycle().await;

        assert!(h.log.evaluations.lock().is_empty());
        assert!(h.state.store.lock().is_open(SYM));
        assert_eq!(h.notifier.created.lock().len(), 1);

        *h.log.fail.lock() = false;
        h.driver.run_evaluation_cycle().await;
        assert_eq!(h.log.evaluations.lock().len(), 1);
    }

    #[tokio::test]
    async fn missing_indicator_skips_symbol_without_mutation() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        h.market
            .set_series(SYM, CandleInterval::SixHours, rising(10));

        h.driver.run_evaluation_cycle().await;

        assert!(!h.state.store.lock().is_open(SYM));
        assert!(h.state.store.lock().last_notified(SYM).is_none());
        assert!(h.notifier.created.lock().is_empty());
        assert!(h.log.evaluations.lock().is_empty());
        let errors = h.state.recent_errors.read();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code.as_deref(), Some("insufficient_history"));
    }

    #[tokio::test]
    async fn one_failing_symbol_does_not_block_others() {
        let h = harness(&[SYM, "SOLUSDT"]);
        seed_bullish(&h.market, SYM, 50.0);
        // SOLUSDT has no data at all.

        h.driver.run_evaluation_cycle().await;

        assert!(h.state.store.lock().is_open(SYM));
        assert!(!h.state.store.lock().is_open("SOLUSDT"));
    }

    #[tokio::test]
    async fn missing_reference_price_keeps_metrics_empty() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        h.market.prices.lock().clear();

        h.driver.run_evaluation_cycle().await;

        let signal = h.state.store.lock().get(SYM).cloned().unwrap();
        assert!(signal.reference_price_at_open.is_none());
        let rows = h.log.evaluations.lock();
        assert!(rows[0].reference_price.is_none());
    }

    #[tokio::test]
    async fn outside_window_never_opens() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        let closed = Utc.with_ymd_and_hms(2024, 6, 3, 1, 30, 0).unwrap();
        let driver = EvaluationDriver::new(
            h.market.clone(),
            h.notifier.clone(),
            h.log.clone(),
            h.state.clone(),
        )
        .with_clock(Arc::new(move || closed));

        driver.run_evaluation_cycle().await;

        assert!(!h.state.store.lock().is_open(SYM));
        assert_eq!(h.log.evaluations.lock().len(), 1);
    }

    #[tokio::test]
    async fn ladder_edits_existing_messages() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        h.driver.run_evaluation_cycle().await;

        h.market
            .set_series(SYM, CandleInterval::OneMinute, falling_to(30, 49.0));
        h.driver.run_evaluation_cycle().await;

        let updated = h.notifier.updated.lock();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].0.len(), 2);
        assert!(updated[0].1.contains("2 entries"));
        assert_eq!(
            h.state.store.lock().get(SYM).unwrap().entry_prices,
            vec![49.0, 50.0]
        );
    }

    // ---- Target check ------------------------------------------------------

    #[tokio::test]
    async fn target_check_closes_and_logs_trade() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        h.driver.run_evaluation_cycle().await;

        h.market.set_price(SYM, 48.5);
        h.driver.run_target_check().await;
        assert!(h.state.store.lock().is_open(SYM));

        h.market.set_price(SYM, 50.7);
        h.market.set_price(REF, 61_200.0);
        h.driver.run_target_check().await;

        assert!(!h.state.store.lock().is_open(SYM));
        let trades = h.log.trades.lock();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_price, 50.7);
        assert_eq!(trades[0].bottom_price, 48.5);
        assert_eq!(trades[0].drawdown_pct, 3.0);
        assert_eq!(trades[0].reference_change_pct, Some(2.0));

        let updated = h.notifier.updated.lock();
        assert_eq!(updated.len(), 1);
        assert!(updated[0].1.contains("TARGET ACHIEVED"));
    }

    #[tokio::test]
    async fn target_check_ignores_idle_symbols() {
        let h = harness(&[SYM]);
        h.market.set_price(SYM, 1_000.0);
        h.driver.run_target_check().await;
        assert!(h.log.trades.lock().is_empty());
        assert!(h.notifier.created.lock().is_empty());
    }

    // ---- Pending notices ---------------------------------------------------

    #[tokio::test]
    async fn failed_open_notice_is_retried_next_cycle() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        h.notifier.set_failing(true);

        h.driver.run_evaluation_cycle().await;
        assert!(h.state.store.lock().is_open(SYM));
        assert_eq!(h.state.store.lock().pending_count(), 1);

        h.notifier.set_failing(false);
        h.driver.run_evaluation_cycle().await;

        assert_eq!(h.state.store.lock().pending_count(), 0);
        assert_eq!(h.notifier.created.lock().len(), 1);
        assert_eq!(h.state.store.lock().get(SYM).unwrap().handles.len(), 2);
    }

    #[tokio::test]
    async fn pending_notice_dropped_after_max_attempts() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        h.notifier.set_failing(true);

        h.driver.run_evaluation_cycle().await;
        for _ in 0..MAX_NOTICE_ATTEMPTS {
            h.driver.retry_pending().await;
        }

        assert_eq!(h.state.store.lock().pending_count(), 0);
        assert!(h.notifier.created.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_close_notice_is_queued() {
        let h = harness(&[SYM]);
        seed_bullish(&h.market, SYM, 50.0);
        h.driver.run_evaluation_cycle().await;

        h.notifier.set_failing(true);
        h.market.set_price(SYM, 60.0);
        h.driver.run_target_check().await;

        assert!(!h.state.store.lock().is_open(SYM));
        assert_eq!(h.log.trades.lock().len(), 1);
        let pending = h.state.store.lock().take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, NoticeKind::Close);
        assert_eq!(pending[0].handles.len(), 2);
    }
}
