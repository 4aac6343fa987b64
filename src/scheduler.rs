// Demand-driven polling: one timer per demanded key, debounced immediate
// refreshes, and at most one fetch in flight per key.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use crate::models::Topic;
use crate::subscriptions::DemandSnapshot;

/// Fetches one key and publishes the result. Must not fail: errors become
/// error-carrying publishes.
#[async_trait]
pub trait Poller: Send + Sync + 'static {
    async fn poll(&self, key: &Topic);
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub debounce: Duration,
}

#[derive(Default)]
struct Debounce {
    last_fire: Option<Instant>,
    deferred: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct State {
    timers: HashMap<Topic, JoinHandle<()>>,
    in_flight: HashSet<Topic>,
    debounce: HashMap<Topic, Debounce>,
    stopped: bool,
}

struct Inner {
    poller: Arc<dyn Poller>,
    config: SchedulerConfig,
    state: Mutex<State>,
}

/// Clears the in-flight mark when the fetch finishes or is dropped.
struct InFlight {
    inner: Arc<Inner>,
    key: Topic,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.lock().in_flight.remove(&self.key);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a fetch unless one is already running for `key`.
    fn fire(self: &Arc<Self>, key: &Topic) {
        {
            let mut state = self.lock();
            if state.stopped {
                return;
            }
            if !state.in_flight.insert(key.clone()) {
                tracing::debug!(topic = %key, "poll still in flight; tick skipped");
                return;
            }
        }
        let guard = InFlight {
            inner: self.clone(),
            key: key.clone(),
        };
        // Spawned apart from the timer so tearing a timer down never aborts a fetch.
        tokio::spawn(async move {
            guard.inner.poller.poll(&guard.key).await;
            drop(guard);
        });
    }

    fn request_refresh(self: &Arc<Self>, key: &Topic) {
        let now = Instant::now();
        let debounce = self.config.debounce;
        let mut state = self.lock();
        if state.stopped || !state.timers.contains_key(key) {
            return;
        }
        let entry = state.debounce.entry(key.clone()).or_default();
        match entry.last_fire {
            Some(last) if now < last + debounce => {
                if entry.deferred.is_some() {
                    return;
                }
                let weak = Arc::downgrade(self);
                let deferred_key = key.clone();
                let at = last + debounce;
                entry.deferred = Some(tokio::spawn(async move {
                    tokio::time::sleep_until(at).await;
                    let Some(inner) = weak.upgrade() else { return };
                    {
                        let mut state = inner.lock();
                        if !state.timers.contains_key(&deferred_key) {
                            return;
                        }
                        let entry = state.debounce.entry(deferred_key.clone()).or_default();
                        entry.deferred = None;
                        entry.last_fire = Some(Instant::now());
                    }
                    inner.fire(&deferred_key);
                }));
            }
            _ => {
                entry.last_fire = Some(now);
                drop(state);
                self.fire(key);
            }
        }
    }
}

fn spawn_timer(inner: Weak<Inner>, key: Topic, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            inner.fire(&key);
        }
    })
}

pub struct PollingScheduler {
    inner: Arc<Inner>,
}

impl PollingScheduler {
    pub fn new(poller: Arc<dyn Poller>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                poller,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Converges timers onto `demand`: removed keys lose their timer, new keys get
    /// one plus an immediate refresh. Returns the new keys.
    pub fn apply_demand(&self, demand: &DemandSnapshot) -> Vec<Topic> {
        let desired = demand.keys();
        let mut added = Vec::new();
        {
            let mut state = self.inner.lock();
            if state.stopped {
                return added;
            }
            let removed: Vec<Topic> = state
                .timers
                .keys()
                .filter(|k| !desired.contains(*k))
                .cloned()
                .collect();
            for key in removed {
                if let Some(timer) = state.timers.remove(&key) {
                    timer.abort();
                }
                if let Some(deferred) = state.debounce.remove(&key).and_then(|d| d.deferred) {
                    deferred.abort();
                }
                tracing::debug!(topic = %key, "polling stopped");
            }
            for key in desired {
                if !state.timers.contains_key(&key) {
                    let timer = spawn_timer(
                        Arc::downgrade(&self.inner),
                        key.clone(),
                        self.inner.config.interval,
                    );
                    state.timers.insert(key.clone(), timer);
                    tracing::debug!(topic = %key, "polling started");
                    added.push(key);
                }
            }
        }
        for key in &added {
            self.inner.request_refresh(key);
        }
        added
    }

    /// Debounced immediate refresh of a demanded key; no-op for keys without a timer.
    pub fn request_refresh(&self, key: &Topic) {
        self.inner.request_refresh(key);
    }

    pub fn active_keys(&self) -> BTreeSet<Topic> {
        self.inner.lock().timers.keys().cloned().collect()
    }

    pub fn timer_count(&self) -> usize {
        self.inner.lock().timers.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Cancels every timer and deferred refresh. In-flight fetches run to completion.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        for (_, debounce) in state.debounce.drain() {
            if let Some(deferred) = debounce.deferred {
                deferred.abort();
            }
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
