// =============================================================================
// Ladder Signals — Main Entry Point
// =============================================================================
//
// Evaluates the configured symbols every minute against the multi-timeframe
// RSI/MACD rules, posts buy signals to Telegram, edits them as entry rungs
// are added and closes them when the target is reached.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod error;
mod evaluation;
mod indicators;
mod lifecycle;
mod notify;
mod ports;
mod reference_tracker;
mod runtime_config;
mod signal_window;
mod trade_log;
mod types;

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::evaluation::EvaluationDriver;
use crate::notify::TelegramNotifier;
use crate::runtime_config::RuntimeConfig;
use crate::trade_log::CsvSignalLog;

const CONFIG_PATH: &str = "signal_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Ladder Signals — Starting Up                      ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env(|key| std::env::var(key).ok());

    if config.telegram_bot_token.is_empty() || config.channel_ids.is_empty() {
        warn!("TELEGRAM_BOT_TOKEN or SIGNAL_CHANNELS not set — notifications will fail and be retried");
    }

    info!(
        symbols = ?config.symbols,
        reference = %config.reference_symbol,
        channels = config.channel_ids.len(),
        crossover_gate = config.strategy.require_long_crossover,
        target_premium = config.strategy.target_premium,
        in_window_now = signal_window::in_signal_window_now(),
        "Configuration loaded"
    );

    // ── 2. Adapters ──────────────────────────────────────────────────────
    let binance = Arc::new(BinanceClient::new(
        config.exchange_base_url.clone(),
        config.fetch_timeout_secs,
    )?);
    let telegram = Arc::new(TelegramNotifier::new(
        config.telegram_bot_token.clone(),
        config.telegram_api_url.clone(),
        config.fetch_timeout_secs,
    )?);
    let signal_log = Arc::new(CsvSignalLog::new(config.log_dir.clone())?);
    info!(
        evaluations = %signal_log.evaluations_path().display(),
        trades = %signal_log.trades_path().display(),
        "CSV logs ready"
    );

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config));

    // ── 3. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 4. Scheduler loops ───────────────────────────────────────────────
    let driver = Arc::new(EvaluationDriver::new(
        binance.clone(),
        telegram,
        signal_log,
        state.clone(),
    ));

    tokio::spawn(driver.clone().run_evaluation_loop());
    tokio::spawn(driver.run_target_loop());

    // ── 5. Exchange weight monitor (every 60 seconds) ────────────────────
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let minute = chrono::Utc::now().timestamp() / 60;
            let snap = binance.rate_limit().snapshot(minute);
            debug!(
                used_weight_1m = snap.used_weight_1m,
                hard_limit = snap.hard_limit,
                "Exchange request weight"
            );
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    let open = state.open_signals();
    if !open.is_empty() {
        warn!(
            count = open.len(),
            symbols = ?open.iter().map(|s| s.symbol.as_str()).collect::<Vec<_>>(),
            "Open signals are not persisted and will be lost"
        );
    }

    if let Err(e) = state.config.save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Ladder Signals shut down complete.");
    Ok(())
}
