//! Rate-limited work queues for the reconcile loops.
//!
//! Semantics the controllers rely on:
//!
//! - a key is processed by at most one worker at a time
//! - re-adds of an in-flight key are deferred until it finishes
//! - failed keys come back with exponential backoff (10 s doubling to a
//!   360 s cap), successful keys have their failure count forgotten
//!
//! Reconcilers are functions from a key to a [`ReconcileAction`]; the
//! queue owns all retry bookkeeping.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);
pub const MAX_BACKOFF: Duration = Duration::from_secs(360);

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Done; clear the failure count and drop the key.
    Forget,
    /// Failed; requeue with exponential backoff.
    Retry,
    /// Done for now; steady-state revisit after the given delay.
    RetryAfter(Duration),
}

struct QueueState<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    in_flight: HashSet<K>,
    /// Keys re-added while being processed; requeued on completion.
    dirty: HashSet<K>,
    attempts: HashMap<K, u32>,
    shut_down: bool,
}

pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl<K> WorkQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Self::with_backoff(DEFAULT_BACKOFF, MAX_BACKOFF)
    }

    pub fn with_backoff(base: Duration, max: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                in_flight: HashSet::new(),
                dirty: HashSet::new(),
                attempts: HashMap::new(),
                shut_down: false,
            }),
            notify: Notify::new(),
            base_backoff: base,
            max_backoff: max,
        })
    }

    /// Enqueue a key, deduplicating against queued and in-flight work.
    pub fn add(self: &Arc<Self>, key: K) {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if state.shut_down {
                return;
            }
            if state.in_flight.contains(&key) {
                state.dirty.insert(key);
                return;
            }
            if !state.queued.insert(key.clone()) {
                return;
            }
            state.queue.push_back(key);
        }
        self.notify.notify_one();
    }

    /// Enqueue after a delay.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Next key to work on; `None` once the queue is shut down.
    pub async fn next(self: &Arc<Self>) -> Option<K> {
        loop {
            {
                let mut state = self.state.lock().expect("queue lock poisoned");
                if state.shut_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.in_flight.insert(key.clone());
                    return Some(key);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Report the outcome for a key handed out by [`next`].
    pub fn done(self: &Arc<Self>, key: K, action: ReconcileAction) {
        let requeue_delay = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.in_flight.remove(&key);
            let was_dirty = state.dirty.remove(&key);

            match action {
                ReconcileAction::Forget => {
                    state.attempts.remove(&key);
                    if was_dirty {
                        Some(Duration::ZERO)
                    } else {
                        None
                    }
                }
                ReconcileAction::Retry => {
                    let attempts = state.attempts.entry(key.clone()).or_insert(0);
                    *attempts += 1;
                    Some(self.backoff_for(*attempts))
                }
                ReconcileAction::RetryAfter(delay) => {
                    state.attempts.remove(&key);
                    Some(delay)
                }
            }
        };

        match requeue_delay {
            Some(delay) if delay.is_zero() => self.add(key),
            Some(delay) => self.add_after(key, delay),
            None => {}
        }
    }

    fn backoff_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1).min(16));
        (self.base_backoff * factor).min(self.max_backoff)
    }

    pub fn shut_down(self: &Arc<Self>) {
        self.state.lock().expect("queue lock poisoned").shut_down = true;
        self.notify.notify_waiters();
    }

    /// Worker loop: pull keys and run the reconciler until shutdown.
    pub async fn run_worker<F, Fut>(self: Arc<Self>, reconcile: F)
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = ReconcileAction>,
    {
        while let Some(key) = self.next().await {
            let action = reconcile(key.clone()).await;
            debug!(?action, "reconcile pass finished");
            self.done(key, action);
        }
    }
}
