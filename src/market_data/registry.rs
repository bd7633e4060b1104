// =============================================================================
// Subscriber Registry: per-key observer list with snapshot delivery
// =============================================================================
//
// Every subscriber owns an unbounded queue drained by its own worker task, so
// delivery from the connection task never waits on a consumer. `deliver`
// iterates a snapshot of the registry; `unregister` flips the subscriber's
// `active` flag before removing it, so a message that races the removal is
// dropped for that consumer instead of being invoked late.
// =============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::kline::Kline;
use crate::types::StreamKey;

/// Opaque handle returned by [`SubscriberRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

struct Subscriber {
    token: SubscriberToken,
    active: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Kline>,
}

/// Callbacks registered against one [`StreamKey`].
pub struct SubscriberRegistry {
    key: StreamKey,
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new(key: StreamKey) -> Self {
        Self {
            key,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Add a callback and spawn its delivery worker on `runtime`.
    pub fn register<F>(&self, runtime: &Handle, mut callback: F) -> SubscriberToken
    where
        F: FnMut(Kline) + Send + 'static,
    {
        let token = SubscriberToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        let active = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = mpsc::unbounded_channel::<Kline>();

        let worker_active = active.clone();
        let key = self.key.clone();
        runtime.spawn(async move {
            while let Some(kline) = rx.recv().await {
                if !worker_active.load(Ordering::Acquire) {
                    break;
                }
                if catch_unwind(AssertUnwindSafe(|| callback(kline))).is_err() {
                    warn!(
                        key = %key,
                        token = token.0,
                        time = kline.time,
                        "subscriber callback panicked; message skipped"
                    );
                }
            }
            debug!(key = %key, token = token.0, "subscriber worker finished");
        });

        self.subscribers.write().push(Arc::new(Subscriber { token, active, tx }));
        token
    }

    /// Remove one callback. Returns `false` when the token is unknown.
    pub fn unregister(&self, token: SubscriberToken) -> bool {
        let mut subs = self.subscribers.write();
        match subs.iter().position(|s| s.token == token) {
            Some(idx) => {
                let sub = subs.remove(idx);
                sub.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Deactivate and remove every subscriber.
    pub fn clear(&self) {
        for sub in self.subscribers.write().drain(..) {
            sub.active.store(false, Ordering::Release);
        }
    }

    /// Queue `kline` for every subscriber registered at the time of the call.
    /// Returns how many subscribers it was queued for.
    pub fn deliver(&self, kline: Kline) -> usize {
        let snapshot: Vec<Arc<Subscriber>> = self.subscribers.read().clone();

        snapshot
            .iter()
            .filter(|s| s.active.load(Ordering::Acquire))
            .filter(|s| s.tx.send(kline).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
