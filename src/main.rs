// =============================================================================
// Scalp Engine: Main Entry Point
// =============================================================================
//
// Opens one chart per configured symbol and logs every change of its
// scalping verdict. Signals are advisory; nothing is traded.
// =============================================================================

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use scalp_engine::binance::{MarketDataClient, DEFAULT_SYMBOL_LIMIT};
use scalp_engine::indicators::rsi_zone;
use scalp_engine::market_data::StreamMultiplexer;
use scalp_engine::runtime_config::CONFIG_FILE;
use scalp_engine::{ChartSession, EngineConfig, HistorySource, SessionSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Scalp Engine starting up");

    let mut config = EngineConfig::load(CONFIG_FILE).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.sanitize();

    // ── 2. Market data plumbing ──────────────────────────────────────────
    let client = MarketDataClient::new(config.rest_base_url.clone(), config.request_timeout())?;
    let mux = StreamMultiplexer::binance(&config.ws_base_url, config.reconnect_delay());

    let symbols = if config.symbols.is_empty() {
        info!("No symbols configured, discovering the most traded USDT pairs");
        client.fetch_popular_symbols(DEFAULT_SYMBOL_LIMIT).await
    } else {
        config.symbols.clone()
    };

    info!(
        symbols = ?symbols,
        interval = %config.interval,
        history_limit = config.history_limit,
        "Configured charts"
    );

    // ── 3. One chart session per symbol ──────────────────────────────────
    let history: Arc<dyn HistorySource> = Arc::new(client);
    let settings = SessionSettings::from(&config);

    let mut tasks = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let history = history.clone();
        let mux = mux.clone();
        let interval = config.interval;
        tasks.push(tokio::spawn(async move {
            let session = ChartSession::open(history, mux, settings, &symbol, interval).await;
            log_signal_changes(session, settings.leverage).await;
        }));
    }

    info!(count = tasks.len(), "Chart sessions launched. Press Ctrl+C to stop.");

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping gracefully");

    for task in &tasks {
        task.abort();
    }
    mux.disconnect_all();

    if let Err(e) = config.save(CONFIG_FILE) {
        error!(error = %e, "Failed to save engine config on shutdown");
    }

    info!("Scalp Engine shut down complete.");
    Ok(())
}

/// Log the session's verdict whenever its direction or strength changes.
async fn log_signal_changes(session: ChartSession, leverage: f64) {
    let mut rx = session.watch();
    let mut last = None;

    loop {
        let snap = rx.borrow_and_update().clone();
        let verdict = (snap.signal.signal_type, snap.signal.strength);

        if last != Some(verdict) && snap.bar_count > 0 {
            if snap.signal.is_actionable() {
                let rsi = snap.indicators.latest_rsi();
                let projected = snap.projected_returns;
                info!(
                    key = %snap.key,
                    signal = %snap.signal.signal_type,
                    strength = %snap.signal.strength,
                    price = ?snap.current_price,
                    change_pct = ?snap.price_change_pct,
                    rsi = ?rsi,
                    rsi_zone = rsi.map_or("n/a", rsi_zone),
                    entry = snap.signal.entry_price,
                    stop_loss = snap.signal.stop_loss,
                    tp1 = snap.signal.take_profit_1,
                    tp1_pct = projected.take_profit_1_pct,
                    leverage,
                    reasons = ?snap.signal.reasons,
                    "signal changed"
                );
            } else {
                debug!(
                    key = %snap.key,
                    price = ?snap.current_price,
                    reasons = ?snap.signal.reasons,
                    "signal neutral"
                );
            }
            last = Some(verdict);
        }

        if rx.changed().await.is_err() {
            break;
        }
    }
}
