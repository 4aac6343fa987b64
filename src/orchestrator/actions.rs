// One-shot action dispatch: errors become `{stdout: "", stderr}`, successful
// mutations republish the topics they touched.

use std::sync::atomic::Ordering;
use tracing::instrument;

use super::{Orchestrator, lock_registry};
use crate::docker_repo::{self, LogOptions};
use crate::error::DockerError;
use crate::models::{
    ActionRequest, ActionResponse, ContainerConfig, ContainerInfo, ImageInfo, NetworkInfo, Topic,
};

type Result<T> = std::result::Result<T, DockerError>;

/// Identifiers end up as positional docker arguments.
fn require(field: &str, value: &str) -> Result<()> {
    docker_repo::validate_operand(field, value)
}

/// Topics whose published state an action can change.
fn affected_topics(request: &ActionRequest) -> Vec<Topic> {
    match request {
        ActionRequest::ImagePull { .. }
        | ActionRequest::ImageRemove { .. }
        | ActionRequest::ImageBuild { .. }
        | ActionRequest::ImageTag { .. } => vec![Topic::Images, Topic::Info],
        ActionRequest::ContainerRun { .. } | ActionRequest::ContainerCreate { .. } => {
            vec![Topic::Containers, Topic::Info]
        }
        ActionRequest::ContainerStop { id, .. }
        | ActionRequest::ContainerStart { id }
        | ActionRequest::ContainerRestart { id, .. }
        | ActionRequest::ContainerRemove { id, .. } => {
            vec![Topic::Containers, Topic::Container(id.clone()), Topic::Info]
        }
        ActionRequest::VolumeCreate { .. }
        | ActionRequest::VolumeRemove { .. }
        | ActionRequest::VolumePrune => vec![Topic::Info],
        ActionRequest::NetworkCreate { .. }
        | ActionRequest::NetworkRemove { .. }
        | ActionRequest::NetworkPrune
        | ActionRequest::ImageInspect { .. }
        | ActionRequest::ImageList
        | ActionRequest::ContainerInspect { .. }
        | ActionRequest::ContainerLogs { .. }
        | ActionRequest::VolumeDir { .. }
        | ActionRequest::VolumeFile { .. } => Vec::new(),
    }
}

impl Orchestrator {
    /// Runs one action. Never fails: every error is folded into the response.
    #[instrument(skip(self, request), fields(operation = request.name()))]
    pub async fn dispatch(&self, request: ActionRequest) -> ActionResponse {
        let operation = request.name();
        if request.is_mutating() && !self.backend_reachable().await {
            tracing::debug!(operation, "action refused; docker unavailable");
            return ActionResponse::failure(DockerError::BackendUnavailable.to_string());
        }
        let affected = affected_topics(&request);
        match self.execute(request).await {
            Ok(response) => {
                tracing::debug!(operation, "action succeeded");
                self.republish(&affected).await;
                response
            }
            Err(e) => {
                tracing::warn!(error = %e, operation, "action failed");
                ActionResponse::failure(e.to_string())
            }
        }
    }

    /// Trusts the last poll while it reported docker up; otherwise probes again
    /// so an idle engine is not stuck refusing actions.
    async fn backend_reachable(&self) -> bool {
        if self.available.load(Ordering::Relaxed) {
            return true;
        }
        let reachable = self.backend.is_installed().await.is_some();
        self.available.store(reachable, Ordering::Relaxed);
        reachable
    }

    async fn republish(&self, topics: &[Topic]) {
        let demand = lock_registry(&self.registry).current_demand();
        for topic in topics.iter().filter(|t| demand.is_demanded(t)) {
            self.feed.publish(topic).await;
        }
    }

    async fn execute(&self, request: ActionRequest) -> Result<ActionResponse> {
        let backend = &self.backend;
        let response = match request {
            ActionRequest::ImagePull { image } => {
                require("image", &image)?;
                backend.image_pull(&image).await?.into()
            }
            ActionRequest::ImageInspect { id } => {
                require("id", &id)?;
                ActionResponse::result(backend.image_inspect(&id).await?)
            }
            ActionRequest::ImageRemove { id, force } => {
                require("id", &id)?;
                let output = backend.image_remove(&id, force).await?;
                if self.config.actions.verify_postconditions
                    && ImageInfo::resolve(&backend.image_list().await?, &id).is_some()
                {
                    return Err(DockerError::PostconditionFailed(format!(
                        "image {} is still present after removal",
                        id
                    )));
                }
                output.into()
            }
            ActionRequest::ImageList => ActionResponse::result(backend.image_list().await?),
            ActionRequest::ImageBuild {
                context,
                tag,
                dockerfile,
            } => {
                require("context", &context)?;
                backend
                    .image_build(&context, tag.as_deref(), dockerfile.as_deref())
                    .await?
                    .into()
            }
            ActionRequest::ImageTag { source, target } => {
                require("source", &source)?;
                require("target", &target)?;
                backend.image_tag(&source, &target).await?.into()
            }

            ActionRequest::ContainerRun { config } => {
                config.validate()?;
                backend.container_run(&config).await?.into()
            }
            ActionRequest::ContainerCreate { config } => {
                config.validate()?;
                backend.container_create(&config).await?.into()
            }
            ActionRequest::ContainerStop { id, timeout } => {
                require("id", &id)?;
                let target = self.container_target(&id).await;
                let output = backend.container_stop(&id, timeout).await?;
                if self.config.actions.verify_postconditions
                    && self
                        .container_after(target.as_deref(), &id)
                        .await?
                        .is_some_and(|c| c.state.is_active())
                {
                    return Err(DockerError::StillActive(format!(
                        "container {} is still running after stop",
                        id
                    )));
                }
                output.into()
            }
            ActionRequest::ContainerStart { id } => {
                require("id", &id)?;
                backend.container_start(&id).await?.into()
            }
            ActionRequest::ContainerRestart { id, timeout } => {
                require("id", &id)?;
                backend.container_restart(&id, timeout).await?.into()
            }
            ActionRequest::ContainerRemove { id, force } => {
                require("id", &id)?;
                let target = self.container_target(&id).await;
                let output = backend.container_remove(&id, force).await?;
                if self.config.actions.verify_postconditions
                    && self.container_after(target.as_deref(), &id).await?.is_some()
                {
                    return Err(DockerError::PostconditionFailed(format!(
                        "container {} still exists after removal",
                        id
                    )));
                }
                output.into()
            }
            ActionRequest::ContainerInspect { id } => {
                require("id", &id)?;
                ActionResponse::result(backend.container_inspect(&id).await?)
            }
            ActionRequest::ContainerLogs {
                id,
                tail,
                follow,
                timestamps,
            } => {
                require("id", &id)?;
                let options = LogOptions {
                    tail,
                    follow,
                    timestamps,
                };
                backend.container_logs(&id, &options).await?.into()
            }

            ActionRequest::NetworkCreate { name, driver } => {
                require("name", &name)?;
                backend.network_create(&name, driver.as_deref()).await?.into()
            }
            ActionRequest::NetworkRemove { id } => {
                require("id", &id)?;
                let target = self.network_target(&id).await;
                let output = backend.network_remove(&id).await?;
                if self.config.actions.verify_postconditions {
                    let networks = backend.network_list().await?;
                    let current = match &target {
                        Some(full) => networks.iter().find(|n| &n.id == full),
                        None => NetworkInfo::resolve(&networks, &id),
                    };
                    if current.is_some() {
                        return Err(DockerError::PostconditionFailed(format!(
                            "network {} still exists after removal",
                            id
                        )));
                    }
                }
                output.into()
            }
            ActionRequest::NetworkPrune => backend.network_prune().await?.into(),

            ActionRequest::VolumeCreate { name, driver } => {
                require("name", &name)?;
                docker_repo::validate_volume_name(&name)?;
                backend.volume_create(&name, driver.as_deref()).await?.into()
            }
            ActionRequest::VolumeRemove { name, force } => {
                require("name", &name)?;
                let output = backend.volume_remove(&name, force).await?;
                if self.config.actions.verify_postconditions
                    && backend.volume_list().await?.iter().any(|v| v.name == name)
                {
                    return Err(DockerError::PostconditionFailed(format!(
                        "volume {} still exists after removal",
                        name
                    )));
                }
                output.into()
            }
            ActionRequest::VolumePrune => backend.volume_prune().await?.into(),
            ActionRequest::VolumeDir { volume, path } => {
                docker_repo::validate_volume_name(&volume)?;
                let path = docker_repo::sanitize_volume_path(&path)?;
                ActionResponse::result(backend.volume_dir(&volume, &path).await?)
            }
            ActionRequest::VolumeFile { volume, path } => {
                docker_repo::validate_volume_name(&volume)?;
                let path = docker_repo::sanitize_volume_path(&path)?;
                if path.is_empty() {
                    return Err(DockerError::invalid("path is required"));
                }
                let volumes = &self.config.volumes;
                if !volumes.is_text_file(&path) {
                    return Err(DockerError::invalid(format!(
                        "{} is not a readable text file (allowed extensions: {})",
                        path,
                        volumes.text_extensions.join(", ")
                    )));
                }
                let content = backend
                    .volume_file(&volume, &path, volumes.max_file_bytes)
                    .await?;
                if content.len() as u64 > volumes.max_file_bytes {
                    return Err(DockerError::invalid(format!(
                        "{} is larger than {} bytes",
                        path, volumes.max_file_bytes
                    )));
                }
                ActionResponse::result(content)
            }
        };
        Ok(response)
    }

    /// Full id of the container `reference` names before an action changes it.
    /// Only looked up when post-conditions are verified.
    async fn container_target(&self, reference: &str) -> Option<String> {
        if !self.config.actions.verify_postconditions {
            return None;
        }
        match self.backend.container_list().await {
            Ok(containers) => ContainerInfo::resolve(&containers, reference).map(|c| c.id.clone()),
            Err(e) => {
                tracing::debug!(error = %e, reference, "container lookup before action failed");
                None
            }
        }
    }

    /// The same container after the action: by its full id when it was
    /// resolved beforehand, otherwise by the original reference.
    async fn container_after(
        &self,
        target: Option<&str>,
        reference: &str,
    ) -> Result<Option<ContainerInfo>> {
        let containers = self.backend.container_list().await?;
        let current = match target {
            Some(full) => containers.iter().find(|c| c.id == full),
            None => ContainerInfo::resolve(&containers, reference),
        };
        Ok(current.cloned())
    }

    async fn network_target(&self, reference: &str) -> Option<String> {
        if !self.config.actions.verify_postconditions {
            return None;
        }
        match self.backend.network_list().await {
            Ok(networks) => NetworkInfo::resolve(&networks, reference).map(|n| n.id.clone()),
            Err(e) => {
                tracing::debug!(error = %e, reference, "network lookup before action failed");
                None
            }
        }
    }

    /// Creates the container when missing and starts it when stopped.
    pub(super) async fn ensure_running(&self, config: &ContainerConfig) -> Result<()> {
        config.validate()?;
        let existing = self
            .backend
            .container_list()
            .await?
            .into_iter()
            .find(|c| c.name == config.name);
        match existing {
            None => {
                self.backend.container_run(config).await?;
                tracing::info!(container = %config.name, image = %config.image, "managed container created");
            }
            Some(c) if c.state.is_active() => {
                tracing::debug!(container = %config.name, "managed container already running");
            }
            Some(_) => {
                self.backend.container_start(&config.name).await?;
                tracing::info!(container = %config.name, "managed container started");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_actions_touch_the_watched_container() {
        let topics = affected_topics(&ActionRequest::ContainerRemove {
            id: "abc".into(),
            force: false,
        });
        assert_eq!(
            topics,
            vec![Topic::Containers, Topic::Container("abc".into()), Topic::Info]
        );
    }

    #[test]
    fn read_only_actions_touch_nothing() {
        assert!(affected_topics(&ActionRequest::ImageList).is_empty());
        assert!(
            affected_topics(&ActionRequest::ContainerInspect { id: "abc".into() }).is_empty()
        );
    }

    #[test]
    fn require_rejects_blank_values() {
        assert!(require("id", " ").is_err());
        assert!(require("id", "abc").is_ok());
    }

    #[test]
    fn require_rejects_flag_like_values() {
        assert!(require("id", "-f").is_err());
        assert!(require("image", "--privileged").is_err());
        assert!(require("name", "db-1").is_ok());
    }
}
