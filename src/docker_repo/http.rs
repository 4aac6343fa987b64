// Docker Engine API backend via bollard (plain HTTP endpoint)

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerSummary, HostConfig, HostConfigLogConfig, Mount, MountTypeEnum,
    NetworkCreateRequest, PortBinding, RestartPolicy, RestartPolicyNameEnum, VolumeCreateRequest,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, DataUsageOptions, InspectContainerOptions,
    InspectNetworkOptions, ListContainersOptions, ListImagesOptions, ListNetworksOptions,
    ListVolumesOptions, LogsOptions, PruneNetworksOptions, PruneVolumesOptions,
    RemoveContainerOptions, RemoveImageOptions, RemoveVolumeOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions, TagImageOptions,
};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use super::{DockerBackend, ExecEvent, ExecHandle, ExecSignal, LogOptions, Result};
use crate::config::DockerConfig;
use crate::error::DockerError;
use crate::models::{
    CommandOutput, CommandSpec, ContainerConfig, ContainerInfo, ContainerState, DiskUsage,
    ImageInfo, MountType, NetworkInfo, RestartPolicyName, UsageSummary, VolumeInfo, parse_memory,
};

const CONNECT_TIMEOUT_SECS: u64 = 120;
const EXEC_CHANNEL_CAPACITY: usize = 64;
/// Ctrl-C on the exec TTY.
const INTERRUPT: u8 = 0x03;

pub struct HttpBackend {
    client: Docker,
}

fn timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_default()
}

fn size(bytes: i64) -> u64 {
    bytes.max(0) as u64
}

/// Splits `repo[:tag]` (registry ports and digests are left in the repo part).
fn split_reference(reference: &str) -> (&str, Option<&str>) {
    if reference.contains('@') {
        return (reference, None);
    }
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, Some(tag)),
        _ => (reference, None),
    }
}

fn command_vec(spec: &Option<CommandSpec>) -> Option<Vec<String>> {
    spec.as_ref().filter(|c| !c.is_empty()).map(CommandSpec::to_vec)
}

fn non_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() { None } else { Some(v) }
}

fn ports_display(summary: &ContainerSummary) -> String {
    summary
        .ports
        .iter()
        .flatten()
        .map(|p| {
            let proto = p
                .typ
                .map(|t| t.to_string().to_lowercase())
                .unwrap_or_else(|| "tcp".into());
            match (p.ip.as_deref(), p.public_port) {
                (Some(ip), Some(public)) => {
                    format!("{}:{}->{}/{}", ip, public, p.private_port, proto)
                }
                (None, Some(public)) => format!("{}->{}/{}", public, p.private_port, proto),
                _ => format!("{}/{}", p.private_port, proto),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn labels_display(labels: Option<&HashMap<String, String>>) -> String {
    let mut pairs: Vec<String> = labels
        .into_iter()
        .flatten()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    pairs.join(",")
}

fn container_info(summary: ContainerSummary) -> ContainerInfo {
    let ports = ports_display(&summary);
    let labels = labels_display(summary.labels.as_ref());
    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name: summary
            .names
            .as_deref()
            .and_then(|n| n.first())
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        command: summary.command.unwrap_or_default(),
        created_at: summary.created.map(timestamp).unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
        state: summary
            .state
            .map(|s| ContainerState::from_docker(&s.to_string()))
            .unwrap_or(ContainerState::Unknown),
        ports,
        labels,
    }
}

fn restart_policy(config: &ContainerConfig) -> Option<RestartPolicy> {
    config.restart.map(|policy| RestartPolicy {
        name: Some(match policy.name {
            RestartPolicyName::No => RestartPolicyNameEnum::NO,
            RestartPolicyName::Always => RestartPolicyNameEnum::ALWAYS,
            RestartPolicyName::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
            RestartPolicyName::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        }),
        maximum_retry_count: match policy.name {
            RestartPolicyName::OnFailure => policy.maximum_retry_count.map(i64::from),
            _ => None,
        },
    })
}

fn memory(value: &Option<String>) -> Result<Option<i64>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some("-1") => Ok(Some(-1)),
        Some(v) => parse_memory(v).map(Some),
    }
}

/// Maps the structured config onto an API create body.
fn create_body(config: &ContainerConfig) -> Result<ContainerCreateBody> {
    let security = &config.security;
    let resources = &config.resources;

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    let mut exposed_ports: Vec<String> = Vec::new();
    for port in &config.ports {
        let key = format!("{}/{}", port.container_port, port.protocol_or_default());
        if !exposed_ports.contains(&key) {
            exposed_ports.push(key.clone());
        }
        port_bindings
            .entry(key)
            .or_insert(None)
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: port.host_port.map(|p| p.to_string()),
            });
    }

    let mounts: Vec<Mount> = config
        .mounts
        .iter()
        .map(|m| Mount {
            target: Some(m.target.clone()),
            source: Some(m.source.clone()).filter(|s| !s.is_empty()),
            typ: Some(match m.mount_type {
                MountType::Bind => MountTypeEnum::BIND,
                MountType::Volume => MountTypeEnum::VOLUME,
                MountType::Tmpfs => MountTypeEnum::TMPFS,
                MountType::Npipe => MountTypeEnum::NPIPE,
            }),
            read_only: Some(m.read_only),
            ..Default::default()
        })
        .collect();

    if security.cgroupns_mode.is_some() {
        tracing::warn!(
            container = %config.name,
            "cgroupnsMode is not applied by the http backend"
        );
    }

    let host_config = HostConfig {
        auto_remove: Some(config.remove),
        binds: non_empty(config.volumes.clone()),
        mounts: non_empty(mounts),
        port_bindings: if port_bindings.is_empty() {
            None
        } else {
            Some(port_bindings)
        },
        publish_all_ports: Some(config.publish_all_ports),
        restart_policy: restart_policy(config),
        network_mode: config.network_mode.clone(),
        extra_hosts: non_empty(config.extra_hosts.clone()),
        dns: non_empty(config.dns.clone()),
        log_config: config.logging.as_ref().map(|l| HostConfigLogConfig {
            typ: Some(l.driver.clone()),
            config: Some(
                l.options
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }),
        privileged: Some(security.privileged),
        cap_add: non_empty(security.cap_add.clone()),
        cap_drop: non_empty(security.cap_drop.clone()),
        security_opt: non_empty(security.security_opts()),
        device_cgroup_rules: non_empty(security.device_cgroup_rules.clone()),
        group_add: non_empty(security.group_add.clone()),
        userns_mode: security.userns_mode.clone(),
        pid_mode: security.pid_mode.clone(),
        ipc_mode: security.ipc_mode.clone(),
        uts_mode: security.uts_mode.clone(),
        sysctls: if config.sysctls.is_empty() {
            None
        } else {
            Some(
                config
                    .sysctls
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        },
        nano_cpus: resources.cpus.map(|c| (c * 1_000_000_000.0) as i64),
        cpu_shares: resources.cpu_shares.map(i64::from),
        cpuset_cpus: resources.cpuset_cpus.clone(),
        memory: memory(&resources.memory)?,
        memory_reservation: memory(&resources.memory_reservation)?,
        memory_swap: memory(&resources.memory_swap)?,
        pids_limit: resources.pids_limit,
        ..Default::default()
    };

    Ok(ContainerCreateBody {
        image: Some(config.image.clone()),
        hostname: config.hostname.clone(),
        domainname: config.domainname.clone(),
        user: config.user.clone(),
        working_dir: config.workdir.clone(),
        tty: Some(config.tty),
        open_stdin: Some(config.interactive),
        env: non_empty(
            config
                .environment
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
        ),
        labels: if config.labels.is_empty() {
            None
        } else {
            Some(
                config
                    .labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        },
        cmd: command_vec(&config.command),
        entrypoint: command_vec(&config.entrypoint),
        exposed_ports: non_empty(exposed_ports),
        stop_signal: config.stop_signal.clone(),
        stop_timeout: config.stop_timeout.map(i64::from),
        host_config: Some(host_config),
        ..Default::default()
    })
}

impl HttpBackend {
    pub fn connect(config: &DockerConfig) -> anyhow::Result<Self> {
        let url = config
            .api_url()
            .ok_or_else(|| anyhow::anyhow!("docker.host and docker.port are required"))?;
        let client =
            Docker::connect_with_http(&url, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?;
        tracing::info!(url = %url, "using docker http backend");
        Ok(Self { client })
    }

    async fn create(&self, config: &ContainerConfig) -> Result<String> {
        config.validate()?;
        let body = create_body(config)?;
        let options = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };
        let response = self.client.create_container(Some(options), body).await?;
        for warning in &response.warnings {
            tracing::warn!(container = %config.name, warning = %warning, "docker create warning");
        }
        Ok(response.id)
    }
}

#[async_trait]
impl DockerBackend for HttpBackend {
    async fn is_installed(&self) -> Option<String> {
        match self.client.version().await {
            Ok(v) => Some(v.version.unwrap_or_else(|| "unknown".into())),
            Err(e) => {
                tracing::debug!(error = %e, operation = "is_installed", "docker API not reachable");
                None
            }
        }
    }

    async fn needs_sudo(&self) -> bool {
        false
    }

    #[instrument(skip(self), fields(repo = "docker_http", operation = "disk_usage"))]
    async fn disk_usage(&self) -> Result<DiskUsage> {
        let df = self.client.df(None::<DataUsageOptions>).await?;

        let images = df.images.unwrap_or_default();
        let images = UsageSummary {
            total_count: images.len() as u64,
            active: images.iter().filter(|i| i.containers > 0).count() as u64,
            size: images.iter().map(|i| size(i.size)).sum(),
            reclaimable: images
                .iter()
                .filter(|i| i.containers <= 0)
                .map(|i| size(i.size))
                .sum(),
        };

        let containers = df.containers.unwrap_or_default();
        let is_running = |c: &ContainerSummary| {
            c.state
                .map(|s| ContainerState::from_docker(&s.to_string()).is_active())
                .unwrap_or(false)
        };
        let containers = UsageSummary {
            total_count: containers.len() as u64,
            active: containers.iter().filter(|c| is_running(c)).count() as u64,
            size: containers.iter().map(|c| size(c.size_rw.unwrap_or(0))).sum(),
            reclaimable: containers
                .iter()
                .filter(|c| !is_running(c))
                .map(|c| size(c.size_rw.unwrap_or(0)))
                .sum(),
        };

        let volumes = df.volumes.unwrap_or_default();
        let usage = |v: &bollard::models::Volume| {
            v.usage_data
                .as_ref()
                .map(|u| (size(u.size), u.ref_count))
                .unwrap_or((0, 0))
        };
        let volumes = UsageSummary {
            total_count: volumes.len() as u64,
            active: volumes.iter().filter(|v| usage(v).1 > 0).count() as u64,
            size: volumes.iter().map(|v| usage(v).0).sum(),
            reclaimable: volumes
                .iter()
                .filter(|v| usage(v).1 <= 0)
                .map(|v| usage(v).0)
                .sum(),
        };

        let cache = df.build_cache.unwrap_or_default();
        let build_cache = UsageSummary {
            total_count: cache.len() as u64,
            active: cache.iter().filter(|c| c.in_use.unwrap_or(false)).count() as u64,
            size: cache.iter().map(|c| size(c.size.unwrap_or(0))).sum(),
            reclaimable: cache
                .iter()
                .filter(|c| !c.in_use.unwrap_or(false) && !c.shared.unwrap_or(false))
                .map(|c| size(c.size.unwrap_or(0)))
                .sum(),
        };

        Ok(DiskUsage {
            images,
            containers,
            volumes,
            build_cache,
            ..Default::default()
        }
        .with_total())
    }

    #[instrument(skip(self), fields(repo = "docker_http", operation = "image_list"))]
    async fn image_list(&self) -> Result<Vec<ImageInfo>> {
        let options = ListImagesOptions {
            all: false,
            ..Default::default()
        };
        let images = self.client.list_images(Some(options)).await?;
        let mut out = Vec::with_capacity(images.len());
        for image in images {
            let created_at = timestamp(image.created);
            let tags = if image.repo_tags.is_empty() {
                vec!["<none>:<none>".to_string()]
            } else {
                image.repo_tags.clone()
            };
            for reference in tags {
                let (repository, tag) = split_reference(&reference);
                out.push(ImageInfo {
                    id: image.id.clone(),
                    repository: repository.to_string(),
                    tag: tag.unwrap_or("<none>").to_string(),
                    created_at: created_at.clone(),
                    size: size(image.size),
                });
            }
        }
        Ok(out)
    }

    async fn image_inspect(&self, id: &str) -> Result<Value> {
        Ok(serde_json::to_value(self.client.inspect_image(id).await?)?)
    }

    async fn image_pull(&self, image: &str) -> Result<CommandOutput> {
        let (repo, tag) = split_reference(image);
        let options = CreateImageOptions {
            from_image: Some(repo.to_string()),
            tag: Some(tag.unwrap_or("latest").to_string()),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);
        let mut lines = Vec::new();
        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                tracing::debug!(image, status = %status, "image pull progress");
                if lines.last() != Some(&status) {
                    lines.push(status);
                }
            }
        }
        Ok(CommandOutput::stdout(lines.join("\n")))
    }

    async fn image_remove(&self, id: &str, force: bool) -> Result<CommandOutput> {
        let options = RemoveImageOptions {
            force,
            ..Default::default()
        };
        let items = self.client.remove_image(id, Some(options), None).await?;
        let lines: Vec<String> = items
            .into_iter()
            .flat_map(|item| {
                item.untagged
                    .map(|u| format!("Untagged: {}", u))
                    .into_iter()
                    .chain(item.deleted.map(|d| format!("Deleted: {}", d)))
            })
            .collect();
        Ok(CommandOutput::stdout(lines.join("\n")))
    }

    async fn image_tag(&self, source: &str, target: &str) -> Result<CommandOutput> {
        let (repo, tag) = split_reference(target);
        let options = TagImageOptions {
            repo: Some(repo.to_string()),
            tag: Some(tag.unwrap_or("latest").to_string()),
            ..Default::default()
        };
        self.client.tag_image(source, Some(options)).await?;
        Ok(CommandOutput::default())
    }

    #[instrument(skip(self), fields(repo = "docker_http", operation = "container_list"))]
    async fn container_list(&self) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = self.client.list_containers(Some(options)).await?;
        Ok(containers.into_iter().map(container_info).collect())
    }

    async fn container_inspect(&self, id: &str) -> Result<Value> {
        let details = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        Ok(serde_json::to_value(details)?)
    }

    async fn container_create(&self, config: &ContainerConfig) -> Result<CommandOutput> {
        Ok(CommandOutput::stdout(self.create(config).await?))
    }

    async fn container_run(&self, config: &ContainerConfig) -> Result<CommandOutput> {
        let id = self.create(config).await?;
        self.client
            .start_container(&id, None::<StartContainerOptions>)
            .await?;
        Ok(CommandOutput::stdout(id))
    }

    async fn container_start(&self, id: &str) -> Result<CommandOutput> {
        self.client
            .start_container(id, None::<StartContainerOptions>)
            .await?;
        Ok(CommandOutput::stdout(id))
    }

    async fn container_stop(&self, id: &str, timeout: Option<u32>) -> Result<CommandOutput> {
        let options = timeout.map(|t| StopContainerOptions {
            t: Some(t as i32),
            ..Default::default()
        });
        self.client.stop_container(id, options).await?;
        Ok(CommandOutput::stdout(id))
    }

    async fn container_restart(&self, id: &str, timeout: Option<u32>) -> Result<CommandOutput> {
        let options = timeout.map(|t| RestartContainerOptions {
            t: Some(t as i32),
            ..Default::default()
        });
        self.client.restart_container(id, options).await?;
        Ok(CommandOutput::stdout(id))
    }

    async fn container_remove(&self, id: &str, force: bool) -> Result<CommandOutput> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client.remove_container(id, Some(options)).await?;
        Ok(CommandOutput::stdout(id))
    }

    async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<CommandOutput> {
        if options.follow {
            return Err(DockerError::Unsupported(
                "follow mode is not available for one-shot log requests".into(),
            ));
        }
        let logs_options = LogsOptions {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: options.timestamps,
            tail: options
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };
        let mut stream = self.client.logs(id, Some(logs_options));
        let mut out = CommandOutput::default();
        while let Some(item) = stream.next().await {
            match item? {
                LogOutput::StdErr { message } => {
                    out.stderr.push_str(&String::from_utf8_lossy(&message))
                }
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    out.stdout.push_str(&String::from_utf8_lossy(&message))
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(out)
    }

    async fn container_exec(&self, id: &str, command: &str) -> Result<ExecHandle> {
        let config = bollard::models::ExecConfig {
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), command.to_string()]),
            ..Default::default()
        };
        let exec_id = self
            .client
            .create_exec(id, config)
            .await
            .map_err(|e| DockerError::ProcessSpawn(e.to_string()))?
            .id;
        let options = StartExecOptions {
            detach: false,
            tty: true,
            ..Default::default()
        };
        let started = self
            .client
            .start_exec(&exec_id, Some(options))
            .await
            .map_err(|e| DockerError::ProcessSpawn(e.to_string()))?;
        let StartExecResults::Attached {
            mut output,
            mut input,
        } = started
        else {
            return Err(DockerError::ProcessSpawn(
                "exec started detached".to_string(),
            ));
        };

        let (handle, endpoint) = ExecHandle::pair(EXEC_CHANNEL_CAPACITY);
        let events = endpoint.events;
        let mut control = endpoint.control;
        let client = self.client.clone();
        tokio::spawn(async move {
            let mut killed = false;
            loop {
                tokio::select! {
                    item = output.next() => match item {
                        Some(Ok(LogOutput::StdErr { message })) => {
                            let chunk = String::from_utf8_lossy(&message).into_owned();
                            if events.send(ExecEvent::Stderr(chunk)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(LogOutput::StdOut { message } | LogOutput::Console { message })) => {
                            let chunk = String::from_utf8_lossy(&message).into_owned();
                            if events.send(ExecEvent::Stdout(chunk)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(LogOutput::StdIn { .. })) => {}
                        Some(Err(e)) => {
                            let _ = events.send(ExecEvent::Stderr(e.to_string())).await;
                            break;
                        }
                        None => break,
                    },
                    signal = control.recv() => match signal {
                        Some(ExecSignal::Terminate) => {
                            let sent = input.write_all(&[INTERRUPT]).await;
                            if let Err(e) = sent.and(input.flush().await) {
                                tracing::debug!(error = %e, "exec interrupt not delivered");
                            }
                        }
                        // The API cannot kill an exec; dropping the stream detaches.
                        Some(ExecSignal::Kill) | None => {
                            killed = true;
                            break;
                        }
                    },
                }
            }
            let code = if killed {
                -1
            } else {
                match client.inspect_exec(&exec_id).await {
                    Ok(info) => info.exit_code.map(|c| c as i32).unwrap_or(-1),
                    Err(e) => {
                        tracing::debug!(error = %e, "exec inspect failed");
                        -1
                    }
                }
            };
            let _ = events.send(ExecEvent::Exited(code)).await;
        });
        Ok(handle)
    }

    async fn network_list(&self) -> Result<Vec<NetworkInfo>> {
        let networks = self
            .client
            .list_networks(None::<ListNetworksOptions>)
            .await?;
        Ok(networks
            .into_iter()
            .map(|n| NetworkInfo {
                id: n.id.unwrap_or_default(),
                name: n.name.unwrap_or_default(),
                driver: n.driver.unwrap_or_default(),
                scope: n.scope.unwrap_or_default(),
            })
            .collect())
    }

    async fn network_inspect(&self, id: &str) -> Result<Value> {
        let network = self
            .client
            .inspect_network(id, None::<InspectNetworkOptions>)
            .await?;
        Ok(serde_json::to_value(network)?)
    }

    async fn network_create(&self, name: &str, driver: Option<&str>) -> Result<CommandOutput> {
        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some(driver.filter(|d| !d.is_empty()).unwrap_or("bridge").to_string()),
            ..Default::default()
        };
        let response = self.client.create_network(request).await?;
        Ok(CommandOutput::stdout(response.id))
    }

    async fn network_remove(&self, id: &str) -> Result<CommandOutput> {
        self.client.remove_network(id).await?;
        Ok(CommandOutput::stdout(id))
    }

    async fn network_prune(&self) -> Result<CommandOutput> {
        let response = self
            .client
            .prune_networks(None::<PruneNetworksOptions>)
            .await?;
        let deleted = response.networks_deleted.unwrap_or_default();
        Ok(CommandOutput::stdout(deleted.join("\n")))
    }

    async fn volume_list(&self) -> Result<Vec<VolumeInfo>> {
        let response = self
            .client
            .list_volumes(None::<ListVolumesOptions>)
            .await?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeInfo {
                name: v.name,
                driver: v.driver,
                mountpoint: v.mountpoint,
                scope: v.scope.map(|s| s.to_string()).unwrap_or_default(),
            })
            .collect())
    }

    async fn volume_inspect(&self, name: &str) -> Result<Value> {
        Ok(serde_json::to_value(self.client.inspect_volume(name).await?)?)
    }

    async fn volume_create(&self, name: &str, driver: Option<&str>) -> Result<CommandOutput> {
        let request = VolumeCreateRequest {
            name: Some(name.to_string()),
            driver: Some(driver.filter(|d| !d.is_empty()).unwrap_or("local").to_string()),
            ..Default::default()
        };
        let volume = self.client.create_volume(request).await?;
        Ok(CommandOutput::stdout(volume.name))
    }

    async fn volume_remove(&self, name: &str, force: bool) -> Result<CommandOutput> {
        self.client
            .remove_volume(name, Some(RemoveVolumeOptions { force }))
            .await?;
        Ok(CommandOutput::stdout(name))
    }

    async fn volume_prune(&self) -> Result<CommandOutput> {
        let response = self
            .client
            .prune_volumes(None::<PruneVolumesOptions>)
            .await?;
        let mut lines = response.volumes_deleted.unwrap_or_default();
        if let Some(bytes) = response.space_reclaimed {
            lines.push(format!("Total reclaimed space: {}B", bytes));
        }
        Ok(CommandOutput::stdout(lines.join("\n")))
    }
}
