// Composition root: subscriptions drive the scheduler, actions go to the backend,
// exec requests go to the session manager.

mod actions;
mod feed;

pub use feed::Feed;

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::docker_repo::DockerBackend;
use crate::exec::ExecSessionManager;
use crate::hub::ClientHub;
use crate::models::{ClientId, ExecIntent, PushMessage, SubscribeReply, SubscribeRequest, Topic};
use crate::scheduler::{PollingScheduler, SchedulerConfig};
use crate::subscriptions::SubscriptionRegistry;

pub(crate) type SharedRegistry = Arc<Mutex<SubscriptionRegistry>>;

pub(crate) fn lock_registry(registry: &SharedRegistry) -> MutexGuard<'_, SubscriptionRegistry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Counters for the periodic stats line and `GET /api/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub ready: bool,
    pub clients: usize,
    pub subscriptions: usize,
    pub timers: usize,
    pub exec_sessions: usize,
    pub backend_available: bool,
}

pub struct Orchestrator {
    config: AppConfig,
    backend: Arc<dyn DockerBackend>,
    hub: Arc<ClientHub>,
    registry: SharedRegistry,
    feed: Arc<Feed>,
    scheduler: PollingScheduler,
    exec: ExecSessionManager,
    /// Last readiness result seen by any fetch. Optimistic until the first one.
    available: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: AppConfig, backend: Arc<dyn DockerBackend>) -> Self {
        let hub = Arc::new(ClientHub::new(config.server.client_channel_capacity));
        let registry: SharedRegistry = Arc::new(Mutex::new(SubscriptionRegistry::new()));
        let available = Arc::new(AtomicBool::new(true));
        let feed = Arc::new(Feed::new(
            backend.clone(),
            hub.clone(),
            registry.clone(),
            available.clone(),
        ));
        let scheduler = PollingScheduler::new(
            feed.clone(),
            SchedulerConfig {
                interval: config.polling.interval(),
                debounce: config.polling.debounce(),
            },
        );
        let exec = ExecSessionManager::new(backend.clone(), hub.clone(), config.exec.kill_timeout());
        Self {
            config,
            backend,
            hub,
            registry,
            feed,
            scheduler,
            exec,
            available,
        }
    }

    /// Opens the push channel of a new client.
    pub fn connect(&self, client: &str) -> mpsc::Receiver<PushMessage> {
        tracing::info!(client_id = client, "client connected");
        self.hub.register(client)
    }

    /// Sets the client's topic, converges polling, and routes a piggybacked exec request.
    pub fn subscribe(&self, client: &str, request: &SubscribeRequest) -> SubscribeReply {
        let topic = request.topic();
        let outcome = match lock_registry(&self.registry).subscribe(client, topic.clone(), Instant::now()) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(client_id = client, error = %e, "subscribe rejected");
                return SubscribeReply::rejected(e.to_string());
            }
        };
        let added = self.scheduler.apply_demand(&outcome.demand);
        if outcome.changed && !added.contains(&topic) {
            self.scheduler.request_refresh(&topic);
        }
        if outcome.changed {
            tracing::debug!(client_id = client, topic = %topic, "client topic changed");
        }

        match request.exec_intent() {
            Some(ExecIntent::Start { container, command }) => {
                self.exec.start(client, &container, &command);
            }
            Some(ExecIntent::Terminate { container }) => {
                if !self.exec.terminate(client, false, false) {
                    tracing::debug!(client_id = client, container = %container, "no exec session to terminate");
                }
            }
            None => {}
        }

        let heartbeat_ms = u64::try_from(self.config.polling.heartbeat().as_millis()).unwrap_or(u64::MAX);
        SubscribeReply::accepted(heartbeat_ms)
    }

    /// Drops the client's subscription, terminates its exec session quietly and
    /// closes its push channel. Safe to call for unknown clients.
    pub fn disconnect(&self, client: &str) {
        let demand = lock_registry(&self.registry).unsubscribe(client);
        self.scheduler.apply_demand(&demand);
        self.exec.terminate(client, false, true);
        if self.hub.unregister(client) {
            tracing::info!(client_id = client, "client disconnected");
        }
    }

    /// Disconnects every client that has not resubscribed within the client timeout.
    pub fn reap_stale_clients(&self) -> Vec<ClientId> {
        let stale = lock_registry(&self.registry)
            .stale_clients(Instant::now(), self.config.polling.client_timeout());
        for client in &stale {
            tracing::info!(client_id = %client, "client missed its heartbeat; disconnecting");
            self.disconnect(client);
        }
        stale
    }

    /// Brings up the configured containers, then opens the registry for subscribers.
    pub async fn start_managed_containers(&self) {
        for container in &self.config.containers {
            if let Err(e) = self.ensure_running(container).await {
                tracing::warn!(
                    container = %container.name,
                    error = %e,
                    operation = "start_managed_container",
                    "managed container not started"
                );
            }
        }
        lock_registry(&self.registry).mark_ready();
        tracing::info!(managed = self.config.containers.len(), "engine ready");
    }

    pub fn stats(&self) -> EngineStats {
        let (ready, subscriptions) = {
            let registry = lock_registry(&self.registry);
            (registry.is_ready(), registry.len())
        };
        EngineStats {
            ready,
            clients: self.hub.count(),
            subscriptions,
            timers: self.scheduler.timer_count(),
            exec_sessions: self.exec.session_count(),
            backend_available: self.available.load(Ordering::Relaxed),
        }
    }

    pub fn active_topics(&self) -> Vec<Topic> {
        self.scheduler.active_keys().into_iter().collect()
    }

    pub fn is_ready(&self) -> bool {
        lock_registry(&self.registry).is_ready()
    }

    /// Stops all polling and force-kills every exec session.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.exec.shutdown();
        tracing::info!("engine stopped");
    }
}
