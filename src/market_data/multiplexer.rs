// =============================================================================
// Stream Multiplexer: one live connection per (symbol, interval)
// =============================================================================
//
// Any number of local consumers may subscribe to the same key; the first one
// spawns the key's connection task and later ones only add a callback. When
// the last subscriber leaves, the key entry is removed and the task is told to
// shut down, which drops the socket or interrupts a pending reconnect sleep.
//
// Per-key task lifecycle:
//
//   Connecting ──ok──▶ Open ──remote close / error──▶ Closed
//        ▲                                              │
//        └──────── sleep(reconnect_delay) ◀── ReconnectPending
//
// The task is the only owner of its reconnect timer, so a key can never have
// more than one pending.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use super::connector::{BinanceConnector, StreamConnector};
use super::kline::{parse_stream_message, Kline};
use super::registry::{SubscriberRegistry, SubscriberToken};
use crate::types::{Interval, StreamKey};

/// Lifecycle of one key's live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    ReconnectPending,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
            Self::ReconnectPending => write!(f, "ReconnectPending"),
        }
    }
}

struct KeyEntry {
    registry: Arc<SubscriberRegistry>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl KeyEntry {
    fn shut_down(mut self) {
        self.registry.clear();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

struct Inner {
    connector: Arc<dyn StreamConnector>,
    reconnect_delay: Duration,
    runtime: Handle,
    keys: Mutex<HashMap<StreamKey, KeyEntry>>,
}

impl Inner {
    fn spawn_connection(&self, key: StreamKey) -> KeyEntry {
        let registry = Arc::new(SubscriberRegistry::new(key.clone()));
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(key = %key, "opening live stream");
        self.runtime.spawn(run_connection(
            key,
            self.connector.clone(),
            registry.clone(),
            state.clone(),
            self.reconnect_delay,
            shutdown_rx,
        ));

        KeyEntry {
            registry,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    fn unsubscribe(&self, key: &StreamKey, token: SubscriberToken) {
        let mut keys = self.keys.lock();
        let Some(entry) = keys.get(key) else {
            return;
        };

        entry.registry.unregister(token);
        let remaining = entry.registry.len();
        debug!(key = %key, remaining, "subscriber removed");

        if remaining == 0 {
            if let Some(entry) = keys.remove(key) {
                entry.shut_down();
            }
            info!(key = %key, "last subscriber left; live stream closed");
        }
    }
}

/// Shares one live connection per [`StreamKey`] among any number of local
/// subscribers. Cheap to clone; all clones drive the same key map.
#[derive(Clone)]
pub struct StreamMultiplexer {
    inner: Arc<Inner>,
}

impl StreamMultiplexer {
    /// Build a multiplexer that spawns its tasks on the current tokio runtime.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn new(connector: Arc<dyn StreamConnector>, reconnect_delay: Duration) -> Self {
        Self::with_runtime(connector, reconnect_delay, Handle::current())
    }

    /// Like [`StreamMultiplexer::new`] but with an explicit runtime handle, so
    /// subscribe/unsubscribe can be called from threads outside the runtime.
    pub fn with_runtime(
        connector: Arc<dyn StreamConnector>,
        reconnect_delay: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                reconnect_delay,
                runtime,
                keys: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Multiplexer over the exchange's public WebSocket endpoint.
    pub fn binance(ws_base_url: &str, reconnect_delay: Duration) -> Self {
        Self::new(Arc::new(BinanceConnector::new(ws_base_url)), reconnect_delay)
    }

    /// Register `on_kline` for `(symbol, interval)`.
    ///
    /// Opens the key's connection if this is its first subscriber. The
    /// returned [`Subscription`] unsubscribes when dropped.
    pub fn subscribe<F>(&self, symbol: &str, interval: Interval, on_kline: F) -> Subscription
    where
        F: FnMut(Kline) + Send + 'static,
    {
        let key = StreamKey::new(symbol, interval);

        let mut keys = self.inner.keys.lock();
        let entry = keys
            .entry(key.clone())
            .or_insert_with(|| self.inner.spawn_connection(key.clone()));
        let token = entry.registry.register(&self.inner.runtime, on_kline);
        debug!(key = %key, subscribers = entry.registry.len(), "subscriber added");
        drop(keys);

        Subscription {
            inner: self.inner.clone(),
            key,
            token: Some(token),
        }
    }

    /// Tear down every key, its subscribers, and any pending reconnects.
    pub fn disconnect_all(&self) {
        let drained: Vec<(StreamKey, KeyEntry)> = self.inner.keys.lock().drain().collect();
        let count = drained.len();
        for (key, entry) in drained {
            debug!(key = %key, "disconnecting");
            entry.shut_down();
        }
        info!(count, "all live streams disconnected");
    }

    /// Keys that currently own a live connection task.
    pub fn active_keys(&self) -> Vec<StreamKey> {
        self.inner.keys.lock().keys().cloned().collect()
    }

    pub fn subscriber_count(&self, key: &StreamKey) -> usize {
        self.inner
            .keys
            .lock()
            .get(key)
            .map_or(0, |e| e.registry.len())
    }

    /// `None` once the key has no subscribers.
    pub fn connection_state(&self, key: &StreamKey) -> Option<ConnectionState> {
        self.inner.keys.lock().get(key).map(|e| *e.state.read())
    }
}

// ---------------------------------------------------------------------------
// Subscription handle
// ---------------------------------------------------------------------------

/// One registered callback. Dropping it unsubscribes.
pub struct Subscription {
    inner: Arc<Inner>,
    key: StreamKey,
    token: Option<SubscriberToken>,
}

impl Subscription {
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(token) = self.token.take() {
            self.inner.unsubscribe(&self.key, token);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.token.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Per-key connection task
// ---------------------------------------------------------------------------

async fn run_connection(
    key: StreamKey,
    connector: Arc<dyn StreamConnector>,
    registry: Arc<SubscriberRegistry>,
    state: Arc<RwLock<ConnectionState>>,
    reconnect_delay: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        *state.write() = ConnectionState::Connecting;

        let connected = tokio::select! {
            _ = &mut shutdown => break,
            res = connector.connect(&key) => res,
        };

        match connected {
            Ok(mut frames) => {
                *state.write() = ConnectionState::Open;
                loop {
                    tokio::select! {
                        _ = &mut shutdown => {
                            *state.write() = ConnectionState::Closed;
                            debug!(key = %key, "live stream task stopped");
                            return;
                        }
                        next = frames.next() => match next {
                            Some(Ok(text)) => handle_frame(&key, &registry, &text),
                            Some(Err(e)) => {
                                error!(key = %key, error = %e, "kline stream read error");
                                break;
                            }
                            None => {
                                warn!(key = %key, "kline stream closed by remote");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!(key = %key, error = %e, "kline stream connect failed");
            }
        }

        *state.write() = ConnectionState::Closed;
        // Only the key's removal ends the task. The registry may still be
        // empty here while the first subscriber is being registered.
        if !matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            break;
        }

        *state.write() = ConnectionState::ReconnectPending;
        info!(
            key = %key,
            delay_ms = reconnect_delay.as_millis() as u64,
            "reconnect scheduled"
        );
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    *state.write() = ConnectionState::Closed;
    debug!(key = %key, "live stream task stopped");
}

/// Decode one frame and fan it out. Bad frames are logged and dropped.
fn handle_frame(key: &StreamKey, registry: &SubscriberRegistry, text: &str) {
    let msg = match parse_stream_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(key = %key, error = %e, "dropping malformed kline message");
            return;
        }
    };

    if msg.symbol.as_deref().is_some_and(|s| s != key.symbol)
        || msg.interval.is_some_and(|iv| iv != key.interval)
    {
        warn!(
            key = %key,
            symbol = ?msg.symbol,
            interval = ?msg.interval,
            "dropping kline addressed to another stream"
        );
        return;
    }

    let delivered = registry.deliver(msg.kline);
    trace!(key = %key, time = msg.kline.time, close = msg.kline.close, delivered, "kline delivered");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
