// Background housekeeping: expires silent clients and logs engine stats.

use std::sync::Arc;
use tokio::time::{Duration, interval};

use crate::orchestrator::Orchestrator;

pub struct WorkerDeps {
    pub orchestrator: Arc<Orchestrator>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Reaping runs at heartbeat cadence; stats logging on its own interval.
pub struct WorkerConfig {
    pub heartbeat: Duration,
    pub stats_log_interval_secs: u64,
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        orchestrator,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        heartbeat,
        stats_log_interval_secs,
    } = config;

    tokio::spawn(async move {
        let mut reap_tick = interval(heartbeat);
        reap_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut clients_reaped_total: u64 = 0;

        loop {
            tokio::select! {
                _ = reap_tick.tick() => {
                    let reaped = orchestrator.reap_stale_clients();
                    if !reaped.is_empty() {
                        clients_reaped_total += reaped.len() as u64;
                        tracing::debug!(
                            operation = "reap_stale_clients",
                            clients_count = reaped.len(),
                            "Stale clients disconnected"
                        );
                    }
                }
                _ = stats_log_tick.tick() => {
                    let stats = orchestrator.stats();
                    tracing::info!(
                        clients = stats.clients,
                        subscriptions = stats.subscriptions,
                        polling_timers = stats.timers,
                        exec_sessions = stats.exec_sessions,
                        docker_available = stats.backend_available,
                        clients_reaped_total,
                        "engine stats"
                    );
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Worker shutting down");
                    break;
                }
            }
        }
    })
}
