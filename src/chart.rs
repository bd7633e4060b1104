// =============================================================================
// Chart Session: one (symbol, interval) view with derived indicators
// =============================================================================
//
// A session owns the active key, a generation counter and the bar series.
// Every accepted bar triggers a full recompute of the indicator set and the
// scalping signal, and the result is published as a `ChartSnapshot` on a
// watch channel.
//
// Switching key bumps the generation, discards all derived state,
// re-subscribes and bootstraps fresh history. Live callbacks and bootstrap
// results carry the generation they were created under; anything stamped
// with an older generation or another key is dropped.
//
// Live updates can be paused. A paused session holds no subscription and
// keeps its bars; resuming subscribes again under the same generation.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::binance::MarketDataClient;
use crate::indicators::IndicatorSet;
use crate::market_data::{Kline, MergeOutcome, Series, StreamMultiplexer, Subscription};
use crate::runtime_config::EngineConfig;
use crate::signals::{evaluate_signal, ProjectedReturns, ScalpSignal, DEFAULT_LEVERAGE};
use crate::types::{Interval, StreamKey};

// ---------------------------------------------------------------------------
// History source
// ---------------------------------------------------------------------------

/// Where bootstrap bars come from. Never fails; an unavailable history is an
/// empty one.
pub trait HistorySource: Send + Sync + 'static {
    fn load_history<'a>(
        &'a self,
        symbol: &'a str,
        interval: Interval,
        limit: u32,
    ) -> BoxFuture<'a, Vec<Kline>>;
}

impl HistorySource for MarketDataClient {
    fn load_history<'a>(
        &'a self,
        symbol: &'a str,
        interval: Interval,
        limit: u32,
    ) -> BoxFuture<'a, Vec<Kline>> {
        self.fetch_history(symbol, interval, limit).boxed()
    }
}

// ---------------------------------------------------------------------------
// Settings & snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub history_limit: u32,
    pub max_bars: usize,
    pub sma_period: Option<usize>,
    pub leverage: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_limit: 500,
            max_bars: 1000,
            sma_period: None,
            leverage: DEFAULT_LEVERAGE,
        }
    }
}

impl From<&EngineConfig> for SessionSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            history_limit: cfg.history_limit,
            max_bars: cfg.max_bars,
            sma_period: cfg.sma_period,
            leverage: cfg.leverage,
        }
    }
}

/// Everything a chart renders for the current key.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub session_id: Uuid,
    pub key: StreamKey,
    pub generation: u64,
    pub bar_count: usize,
    pub last_bar: Option<Kline>,
    pub current_price: Option<f64>,
    pub previous_price: Option<f64>,
    /// Change of the current price against the first bar's open, in percent.
    pub price_change_pct: Option<f64>,
    pub indicators: IndicatorSet,
    pub signal: ScalpSignal,
    pub projected_returns: ProjectedReturns,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct ChartState {
    key: StreamKey,
    generation: u64,
    series: Series,
    indicators: IndicatorSet,
    signal: ScalpSignal,
    current_price: Option<f64>,
    previous_price: Option<f64>,
}

impl ChartState {
    fn empty(key: StreamKey, generation: u64, max_bars: usize) -> Self {
        Self {
            series: Series::new(key.clone(), max_bars),
            key,
            generation,
            indicators: IndicatorSet::default(),
            signal: ScalpSignal::insufficient_data(),
            current_price: None,
            previous_price: None,
        }
    }

    fn accepts(&self, key: &StreamKey, generation: u64) -> bool {
        self.generation == generation && &self.key == key
    }

    fn snapshot(&self, session_id: Uuid, leverage: f64) -> ChartSnapshot {
        let price_change_pct = match (self.series.bars().first(), self.current_price) {
            (Some(first), Some(price)) if first.open > 0.0 => {
                Some((price - first.open) / first.open * 100.0)
            }
            _ => None,
        };

        ChartSnapshot {
            session_id,
            key: self.key.clone(),
            generation: self.generation,
            bar_count: self.series.len(),
            last_bar: self.series.last().copied(),
            current_price: self.current_price,
            previous_price: self.previous_price,
            price_change_pct,
            indicators: self.indicators.clone(),
            signal: self.signal.clone(),
            projected_returns: self.signal.projected_returns(leverage),
            updated_at: Utc::now(),
        }
    }
}

struct Shared {
    id: Uuid,
    settings: SessionSettings,
    state: Mutex<ChartState>,
    snapshots: watch::Sender<ChartSnapshot>,
}

impl Shared {
    /// Start over on `key` under a fresh generation.
    fn reset(&self, key: StreamKey) -> u64 {
        let mut state = self.state.lock();
        let generation = state.generation + 1;
        *state = ChartState::empty(key, generation, self.settings.max_bars);
        self.publish(&state);
        generation
    }

    fn invalidate(&self) {
        self.state.lock().generation += 1;
    }

    fn apply_bootstrap(&self, key: &StreamKey, generation: u64, bars: Vec<Kline>) -> bool {
        let mut state = self.state.lock();
        if !state.accepts(key, generation) {
            debug!(
                session = %self.id,
                key = %key,
                generation,
                current = state.generation,
                "discarding bootstrap for a superseded chart"
            );
            return false;
        }

        state.series.bootstrap(bars);
        state.current_price = state.series.last().map(|k| k.close);
        state.previous_price = state.current_price;
        self.recompute(&mut state);
        self.publish(&state);
        true
    }

    fn apply_live(&self, key: &StreamKey, generation: u64, kline: Kline) {
        let mut state = self.state.lock();
        if !state.accepts(key, generation) {
            trace!(session = %self.id, key = %key, generation, "dropping kline for a superseded chart");
            return;
        }

        if state.series.merge(kline) == MergeOutcome::Stale {
            return;
        }

        state.previous_price = state.current_price;
        state.current_price = Some(kline.close);
        self.recompute(&mut state);
        self.publish(&state);
    }

    fn recompute(&self, state: &mut ChartState) {
        let bars = state.series.bars();
        let indicators = IndicatorSet::compute(bars, self.settings.sma_period);
        let signal = evaluate_signal(
            bars,
            indicators.latest_ema_fast(),
            indicators.latest_ema_slow(),
            indicators.latest_rsi(),
            state.key.interval,
        );
        state.indicators = indicators;
        state.signal = signal;
    }

    fn publish(&self, state: &ChartState) {
        self.snapshots
            .send_replace(state.snapshot(self.id, self.settings.leverage));
    }
}

// ---------------------------------------------------------------------------
// ChartSession
// ---------------------------------------------------------------------------

/// Subscription slot plus the flags that decide whether it may be filled.
#[derive(Default)]
struct LiveFeed {
    paused: bool,
    closed: bool,
    subscription: Option<Subscription>,
}

/// A live chart over one stream key at a time.
///
/// Dropping the session releases its stream subscription.
pub struct ChartSession {
    shared: Arc<Shared>,
    history: Arc<dyn HistorySource>,
    mux: StreamMultiplexer,
    live: Mutex<LiveFeed>,
}

impl ChartSession {
    /// Subscribe to `(symbol, interval)` and wait for its bootstrap.
    pub async fn open(
        history: Arc<dyn HistorySource>,
        mux: StreamMultiplexer,
        settings: SessionSettings,
        symbol: &str,
        interval: Interval,
    ) -> Self {
        let id = Uuid::new_v4();
        let initial = ChartState::empty(StreamKey::new(symbol, interval), 0, settings.max_bars);
        let (snapshots, _) = watch::channel(initial.snapshot(id, settings.leverage));

        let session = Self {
            shared: Arc::new(Shared {
                id,
                settings,
                state: Mutex::new(initial),
                snapshots,
            }),
            history,
            mux,
            live: Mutex::new(LiveFeed::default()),
        };

        session.switch(symbol, interval).await;
        session
    }

    /// Move the chart to another key (or reload the current one).
    ///
    /// Returns once the new key's history has been requested and, unless
    /// another switch overtook this one, applied. A paused session stays
    /// paused and only bootstraps.
    pub async fn switch(&self, symbol: &str, interval: Interval) {
        let key = StreamKey::new(symbol, interval);

        let (generation, previous) = {
            let mut live = self.live.lock();
            live.closed = false;
            let generation = self.shared.reset(key.clone());
            let next = (!live.paused).then(|| self.subscribe_live(&key, generation));
            (generation, std::mem::replace(&mut live.subscription, next))
        };
        // The new subscription exists before the old one goes, so a reload of
        // the same key keeps its connection.
        drop(previous);

        info!(session = %self.shared.id, key = %key, generation, "chart switched");

        let bars = self
            .history
            .load_history(&key.symbol, interval, self.shared.settings.history_limit)
            .await;
        let count = bars.len();
        if self.shared.apply_bootstrap(&key, generation, bars) {
            info!(session = %self.shared.id, key = %key, bars = count, "chart bootstrapped");
        }
    }

    /// Stop merging live bars. The series and snapshot are kept as they are.
    pub fn pause_live(&self) {
        let previous = {
            let mut live = self.live.lock();
            live.paused = true;
            live.subscription.take()
        };
        if let Some(sub) = previous {
            info!(session = %self.shared.id, key = %sub.key(), "live updates paused");
        }
    }

    /// Subscribe again to the current key. No-op unless paused, and after
    /// [`close`](Self::close).
    pub fn resume_live(&self) {
        let mut live = self.live.lock();
        if !live.paused {
            return;
        }
        live.paused = false;
        if live.closed {
            return;
        }

        let (key, generation) = {
            let state = self.shared.state.lock();
            (state.key.clone(), state.generation)
        };
        live.subscription = Some(self.subscribe_live(&key, generation));
        info!(session = %self.shared.id, key = %key, generation, "live updates resumed");
    }

    /// `true` while a live subscription is held.
    pub fn is_live(&self) -> bool {
        self.live.lock().subscription.is_some()
    }

    /// Release the stream subscription. Pending bootstraps are discarded.
    pub fn close(&self) {
        let previous = {
            let mut live = self.live.lock();
            live.closed = true;
            self.shared.invalidate();
            live.subscription.take()
        };
        if let Some(sub) = previous {
            info!(session = %self.shared.id, key = %sub.key(), "chart closed");
        }
    }

    fn subscribe_live(&self, key: &StreamKey, generation: u64) -> Subscription {
        let shared = self.shared.clone();
        let live_key = key.clone();
        self.mux.subscribe(&key.symbol, key.interval, move |kline| {
            shared.apply_live(&live_key, generation, kline)
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn key(&self) -> StreamKey {
        self.shared.state.lock().key.clone()
    }

    /// Copy of the current bars, oldest first.
    pub fn bars(&self) -> Vec<Kline> {
        self.shared.state.lock().series.bars().to_vec()
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// Receiver that is notified on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<ChartSnapshot> {
        self.shared.snapshots.subscribe()
    }
}

impl std::fmt::Debug for ChartSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartSession")
            .field("id", &self.shared.id)
            .field("key", &self.key())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
