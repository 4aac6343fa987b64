use anyhow::Result;
use dockerbridge::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        backend = ?app_config.docker.backend,
        managed_containers = app_config.containers.len(),
        "Starting {}",
        version::describe()
    );

    let backend = docker_repo::connect(&app_config.docker)?;
    match backend.is_installed().await {
        Some(v) => tracing::info!(docker_version = %v, "Docker is reachable"),
        None => tracing::warn!("Docker is not reachable yet; clients will see errors until it is"),
    }

    let orchestrator = Arc::new(orchestrator::Orchestrator::new(
        app_config.clone(),
        backend,
    ));
    orchestrator.start_managed_containers().await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            orchestrator: orchestrator.clone(),
            shutdown_rx,
        },
        worker::WorkerConfig {
            heartbeat: app_config.polling.heartbeat(),
            stats_log_interval_secs: app_config.polling.stats_log_interval_secs,
        },
    );

    let app = routes::app(orchestrator.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let result = tokio::select! {
        result = axum::serve(listener, app) => result.map_err(anyhow::Error::from),
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;
    orchestrator.shutdown();
    result
}
