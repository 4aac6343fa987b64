// Shared test helpers: scriptable in-memory backend and a recording publisher

#![allow(dead_code)]

use async_trait::async_trait;
use dockerbridge::config::AppConfig;
use dockerbridge::docker_repo::{
    DockerBackend, ExecEvent, ExecHandle, ExecSignal, LogOptions, Result,
};
use dockerbridge::error::DockerError;
use dockerbridge::hub::Publisher;
use dockerbridge::models::*;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Duration;

pub const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "127.0.0.1"

[polling]
interval_ms = 10000
debounce_ms = 1000
heartbeat_secs = 30
client_timeout_secs = 90
"#;

pub fn test_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

pub fn container(id: &str, name: &str, state: ContainerState) -> ContainerInfo {
    ContainerInfo {
        id: id.into(),
        name: name.into(),
        image: "nginx:latest".into(),
        command: "nginx -g 'daemon off;'".into(),
        created_at: "2026-01-01 00:00:00 +0000 UTC".into(),
        status: String::new(),
        state,
        ports: String::new(),
        labels: String::new(),
    }
}

pub fn image(id: &str, repository: &str, tag: &str) -> ImageInfo {
    ImageInfo {
        id: id.into(),
        repository: repository.into(),
        tag: tag.into(),
        created_at: String::new(),
        size: 1024,
    }
}

/// How a fake exec process behaves.
#[derive(Debug, Clone)]
pub struct ExecScript {
    /// Emitted right after start, in order.
    pub output: Vec<ExecEvent>,
    /// Exit immediately after the output with this code; `None` keeps running.
    pub exit: Option<i32>,
    /// Exit with 143 on a graceful terminate; otherwise only a kill ends it.
    pub obey_terminate: bool,
    /// Make `container_exec` fail with this message.
    pub spawn_error: Option<String>,
}

impl Default for ExecScript {
    fn default() -> Self {
        Self {
            output: Vec::new(),
            exit: Some(0),
            obey_terminate: true,
            spawn_error: None,
        }
    }
}

pub struct FakeState {
    pub installed: bool,
    pub containers: Vec<ContainerInfo>,
    pub images: Vec<ImageInfo>,
    pub networks: Vec<NetworkInfo>,
    pub volumes: Vec<VolumeInfo>,
    /// `container_stop` reports success but leaves the container running.
    pub stop_is_noop: bool,
    /// `*_remove` reports success but leaves the object listed.
    pub remove_is_noop: bool,
    pub exec: ExecScript,
    pub volume_file: String,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            installed: true,
            containers: Vec::new(),
            images: Vec::new(),
            networks: Vec::new(),
            volumes: Vec::new(),
            stop_is_noop: false,
            remove_is_noop: false,
            exec: ExecScript::default(),
            volume_file: String::new(),
        }
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub state: Mutex<FakeState>,
    /// Operation log, e.g. `container_remove abc`.
    pub calls: Mutex<Vec<String>>,
    /// Signals received by fake exec processes.
    pub signals: Arc<Mutex<Vec<ExecSignal>>>,
    pub list_calls: AtomicUsize,
    pub concurrent_lists: AtomicUsize,
    pub max_concurrent_lists: AtomicUsize,
    /// Artificial latency of `container_list`.
    pub list_delay: Mutex<Duration>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_containers(containers: Vec<ContainerInfo>) -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().containers = containers;
        backend
    }

    pub fn set_installed(&self, installed: bool) {
        self.state.lock().unwrap().installed = installed;
    }

    pub fn set_exec(&self, script: ExecScript) {
        self.state.lock().unwrap().exec = script;
    }

    pub fn signals(&self) -> Vec<ExecSignal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn ok(message: impl Into<String>) -> Result<CommandOutput> {
        Ok(CommandOutput::stdout(message))
    }

    fn container_mut<'a>(
        containers: &'a mut [ContainerInfo],
        id: &str,
    ) -> Result<&'a mut ContainerInfo> {
        let full = ContainerInfo::resolve(containers, id)
            .map(|c| c.id.clone())
            .ok_or_else(|| DockerError::NotFound(format!("No such container: {}", id)))?;
        containers
            .iter_mut()
            .find(|c| c.id == full)
            .ok_or_else(|| DockerError::NotFound(format!("No such container: {}", id)))
    }
}

#[async_trait]
impl DockerBackend for FakeBackend {
    async fn is_installed(&self) -> Option<String> {
        self.record("is_installed");
        self.state
            .lock()
            .unwrap()
            .installed
            .then(|| "27.3.1".to_string())
    }

    async fn needs_sudo(&self) -> bool {
        false
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        self.record("disk_usage");
        Ok(DiskUsage::default().with_total())
    }

    async fn image_list(&self) -> Result<Vec<ImageInfo>> {
        self.record("image_list");
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn image_inspect(&self, id: &str) -> Result<Value> {
        self.record(format!("image_inspect {}", id));
        let state = self.state.lock().unwrap();
        ImageInfo::resolve(&state.images, id)
            .map(|i| json!({ "Id": i.id, "RepoTags": [i.reference()] }))
            .ok_or_else(|| DockerError::NotFound(format!("No such image: {}", id)))
    }

    async fn image_pull(&self, image: &str) -> Result<CommandOutput> {
        self.record(format!("image_pull {}", image));
        let (repository, tag) = image.split_once(':').unwrap_or((image, "latest"));
        let mut state = self.state.lock().unwrap();
        let id = format!("sha256:{:064}", state.images.len() + 1);
        state.images.push(self::image(&id, repository, tag));
        Self::ok(format!("Status: Downloaded newer image for {}", image))
    }

    async fn image_remove(&self, id: &str, _force: bool) -> Result<CommandOutput> {
        self.record(format!("image_remove {}", id));
        let mut state = self.state.lock().unwrap();
        let Some(full) = ImageInfo::resolve(&state.images, id).map(|i| i.id.clone()) else {
            return Err(DockerError::NotFound(format!("No such image: {}", id)));
        };
        if !state.remove_is_noop {
            state.images.retain(|i| i.id != full);
        }
        Self::ok(format!("Untagged: {}", id))
    }

    async fn image_tag(&self, source: &str, target: &str) -> Result<CommandOutput> {
        self.record(format!("image_tag {} {}", source, target));
        Self::ok("")
    }

    async fn container_list(&self) -> Result<Vec<ContainerInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.concurrent_lists.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_lists.fetch_max(now, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.concurrent_lists.fetch_sub(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().containers.clone())
    }

    async fn container_inspect(&self, id: &str) -> Result<Value> {
        self.record(format!("container_inspect {}", id));
        let state = self.state.lock().unwrap();
        ContainerInfo::resolve(&state.containers, id)
            .map(|c| json!({ "Id": c.id, "Name": format!("/{}", c.name), "State": { "Status": c.state } }))
            .ok_or_else(|| DockerError::NotFound(format!("No such container: {}", id)))
    }

    async fn container_create(&self, config: &ContainerConfig) -> Result<CommandOutput> {
        self.record(format!("container_create {}", config.name));
        let mut state = self.state.lock().unwrap();
        let id = format!("{:012x}", state.containers.len() + 1);
        state
            .containers
            .push(container(&id, &config.name, ContainerState::Created));
        Self::ok(id)
    }

    async fn container_run(&self, config: &ContainerConfig) -> Result<CommandOutput> {
        self.record(format!("container_run {}", config.name));
        let mut state = self.state.lock().unwrap();
        if state.containers.iter().any(|c| c.name == config.name) {
            return Err(DockerError::CommandFailed {
                command: "run".into(),
                status: "exit status: 125".into(),
                stderr: format!("Conflict. The container name \"/{}\" is already in use", config.name),
            });
        }
        let id = format!("{:012x}", state.containers.len() + 1);
        state
            .containers
            .push(container(&id, &config.name, ContainerState::Running));
        Self::ok(id)
    }

    async fn container_start(&self, id: &str) -> Result<CommandOutput> {
        self.record(format!("container_start {}", id));
        let mut state = self.state.lock().unwrap();
        let c = Self::container_mut(&mut state.containers, id)?;
        c.state = ContainerState::Running;
        Self::ok(id)
    }

    async fn container_stop(&self, id: &str, _timeout: Option<u32>) -> Result<CommandOutput> {
        self.record(format!("container_stop {}", id));
        let mut state = self.state.lock().unwrap();
        let noop = state.stop_is_noop;
        let c = Self::container_mut(&mut state.containers, id)?;
        if !noop {
            c.state = ContainerState::Exited;
        }
        Self::ok(id)
    }

    async fn container_restart(&self, id: &str, _timeout: Option<u32>) -> Result<CommandOutput> {
        self.record(format!("container_restart {}", id));
        Self::ok(id)
    }

    async fn container_remove(&self, id: &str, _force: bool) -> Result<CommandOutput> {
        self.record(format!("container_remove {}", id));
        let mut state = self.state.lock().unwrap();
        let Some(full) = ContainerInfo::resolve(&state.containers, id).map(|c| c.id.clone()) else {
            return Err(DockerError::NotFound(format!("No such container: {}", id)));
        };
        if !state.remove_is_noop {
            state.containers.retain(|c| c.id != full);
        }
        Self::ok(id)
    }

    async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<CommandOutput> {
        self.record(format!("container_logs {} tail={:?}", id, options.tail));
        Ok(CommandOutput {
            stdout: "line 1\nline 2\n".into(),
            stderr: "warning line\n".into(),
        })
    }

    async fn container_exec(&self, id: &str, command: &str) -> Result<ExecHandle> {
        self.record(format!("container_exec {} {}", id, command));
        let script = self.state.lock().unwrap().exec.clone();
        if let Some(message) = script.spawn_error {
            return Err(DockerError::ProcessSpawn(message));
        }
        let (handle, mut endpoint) = ExecHandle::pair(32);
        let recorded = self.signals.clone();
        tokio::spawn(async move {
            for event in script.output {
                let _ = endpoint.events.send(event).await;
            }
            if let Some(code) = script.exit {
                let _ = endpoint.events.send(ExecEvent::Exited(code)).await;
                return;
            }
            loop {
                match endpoint.control.recv().await {
                    Some(ExecSignal::Terminate) => {
                        recorded.lock().unwrap().push(ExecSignal::Terminate);
                        if script.obey_terminate {
                            let _ = endpoint.events.send(ExecEvent::Exited(143)).await;
                            return;
                        }
                    }
                    Some(ExecSignal::Kill) | None => {
                        recorded.lock().unwrap().push(ExecSignal::Kill);
                        let _ = endpoint.events.send(ExecEvent::Exited(-1)).await;
                        return;
                    }
                }
            }
        });
        Ok(handle)
    }

    async fn network_list(&self) -> Result<Vec<NetworkInfo>> {
        Ok(self.state.lock().unwrap().networks.clone())
    }

    async fn network_inspect(&self, id: &str) -> Result<Value> {
        Ok(json!({ "Id": id }))
    }

    async fn network_create(&self, name: &str, _driver: Option<&str>) -> Result<CommandOutput> {
        self.record(format!("network_create {}", name));
        Self::ok(name)
    }

    async fn network_remove(&self, id: &str) -> Result<CommandOutput> {
        self.record(format!("network_remove {}", id));
        let mut state = self.state.lock().unwrap();
        let Some(full) = NetworkInfo::resolve(&state.networks, id).map(|n| n.id.clone()) else {
            return Err(DockerError::NotFound(format!("network {} not found", id)));
        };
        if !state.remove_is_noop {
            state.networks.retain(|n| n.id != full);
        }
        Self::ok(id)
    }

    async fn network_prune(&self) -> Result<CommandOutput> {
        self.record("network_prune");
        Self::ok("")
    }

    async fn volume_list(&self) -> Result<Vec<VolumeInfo>> {
        Ok(self.state.lock().unwrap().volumes.clone())
    }

    async fn volume_inspect(&self, name: &str) -> Result<Value> {
        Ok(json!({ "Name": name }))
    }

    async fn volume_create(&self, name: &str, _driver: Option<&str>) -> Result<CommandOutput> {
        self.record(format!("volume_create {}", name));
        Self::ok(name)
    }

    async fn volume_remove(&self, name: &str, _force: bool) -> Result<CommandOutput> {
        self.record(format!("volume_remove {}", name));
        Self::ok(name)
    }

    async fn volume_prune(&self) -> Result<CommandOutput> {
        self.record("volume_prune");
        Self::ok("")
    }

    async fn volume_dir(&self, volume: &str, path: &str) -> Result<Vec<VolumeEntry>> {
        self.record(format!("volume_dir {} {}", volume, path));
        Ok(vec![VolumeEntry {
            name: "nginx.conf".into(),
            kind: EntryKind::File,
            size: 12,
            modified: 1_700_000_000,
        }])
    }

    async fn volume_file(&self, volume: &str, path: &str, max_bytes: u64) -> Result<String> {
        self.record(format!("volume_file {} {}", volume, path));
        let content = self.state.lock().unwrap().volume_file.clone();
        Ok(content.chars().take(max_bytes as usize + 1).collect())
    }
}

/// Publisher that keeps every push for later assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    pub messages: Mutex<Vec<(String, PushMessage)>>,
}

impl RecordingPublisher {
    pub fn for_client(&self, client: &str) -> Vec<PushMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == client)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn last_for(&self, client: &str) -> Option<PushMessage> {
        self.for_client(client).pop()
    }
}

impl Publisher for RecordingPublisher {
    fn send(&self, client: &str, message: PushMessage) {
        self.messages
            .lock()
            .unwrap()
            .push((client.to_string(), message));
    }
}

/// Lets spawned tasks run; with paused time this also fires due timers.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
