// Topic fetch + publish. Wraps the backend so every fetch ends in a push,
// data or error, to whoever is subscribed when the result arrives.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;

use super::{SharedRegistry, lock_registry};
use crate::docker_repo::DockerBackend;
use crate::error::DockerError;
use crate::hub::Publisher;
use crate::models::{EngineInfo, PushMessage, Topic};
use crate::scheduler::Poller;

pub struct Feed {
    backend: Arc<dyn DockerBackend>,
    publisher: Arc<dyn Publisher>,
    registry: SharedRegistry,
    available: Arc<AtomicBool>,
}

impl Feed {
    pub(crate) fn new(
        backend: Arc<dyn DockerBackend>,
        publisher: Arc<dyn Publisher>,
        registry: SharedRegistry,
        available: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            publisher,
            registry,
            available,
        }
    }

    /// Readiness first; an unreachable backend skips the data call.
    #[instrument(level = "debug", skip(self), fields(topic = %topic))]
    pub async fn fetch(&self, topic: &Topic) -> PushMessage {
        let Some(version) = self.backend.is_installed().await else {
            if self.available.swap(false, Ordering::Relaxed) {
                tracing::warn!(operation = "is_installed", "docker became unavailable");
            }
            return PushMessage::error_for(topic, DockerError::BackendUnavailable.to_string());
        };
        if !self.available.swap(true, Ordering::Relaxed) {
            tracing::info!(version = %version, "docker is available again");
        }

        match topic {
            Topic::Info => {
                let needs_sudo = self.backend.needs_sudo().await;
                match self.backend.disk_usage().await {
                    Ok(disk_usage) => PushMessage::Info {
                        data: Some(EngineInfo {
                            needs_sudo,
                            disk_usage,
                        }),
                        error: None,
                        version: Some(version),
                    },
                    Err(e) => PushMessage::Info {
                        data: None,
                        error: Some(e.to_string()),
                        version: Some(version),
                    },
                }
            }
            Topic::Images => match self.backend.image_list().await {
                Ok(images) => PushMessage::Images {
                    data: Some(images),
                    error: None,
                },
                Err(e) => PushMessage::error_for(topic, e.to_string()),
            },
            Topic::Containers => match self.backend.container_list().await {
                Ok(containers) => PushMessage::Containers {
                    data: Some(containers),
                    error: None,
                },
                Err(e) => PushMessage::error_for(topic, e.to_string()),
            },
            Topic::Container(id) => match self.backend.container_inspect(id).await {
                Ok(data) => PushMessage::Container {
                    container: id.clone(),
                    data: Some(data),
                    error: None,
                },
                Err(e) => PushMessage::error_for(topic, e.to_string()),
            },
        }
    }

    /// Fetches `topic` and sends the result to its current subscribers.
    pub async fn publish(&self, topic: &Topic) {
        let message = self.fetch(topic).await;
        if let Some(error) = message.error() {
            tracing::debug!(topic = %topic, error, "publishing error");
        }
        let subscribers = lock_registry(&self.registry).subscribers_of(topic);
        for client in subscribers {
            self.publisher.send(&client, message.clone());
        }
    }
}

#[async_trait]
impl Poller for Feed {
    async fn poll(&self, key: &Topic) {
        self.publish(key).await;
    }
}
