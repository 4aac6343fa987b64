// Docker backend contract and its two implementations (CLI and HTTP API)

mod cli;
mod http;
mod parse;

pub use cli::CliBackend;
pub use http::HttpBackend;
pub use parse::parse_size;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{BackendKind, DockerConfig};
use crate::error::DockerError;
use crate::models::{
    CommandOutput, ContainerConfig, ContainerInfo, DiskUsage, ImageInfo, NetworkInfo, VolumeEntry,
    VolumeInfo,
};

pub type Result<T> = std::result::Result<T, DockerError>;

/// Output chunk or termination of an exec process. `Exited` is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(String),
    Stderr(String),
    /// Exit code; -1 when the process was killed by a signal.
    Exited(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecSignal {
    /// Ask the process to stop (SIGTERM or an interrupt on the TTY).
    Terminate,
    Kill,
}

/// Engine side of a running exec process.
pub struct ExecHandle {
    pub events: mpsc::Receiver<ExecEvent>,
    pub control: mpsc::Sender<ExecSignal>,
}

/// Backend side of a running exec process.
pub struct ExecEndpoint {
    pub events: mpsc::Sender<ExecEvent>,
    pub control: mpsc::Receiver<ExecSignal>,
}

impl ExecHandle {
    pub fn pair(capacity: usize) -> (ExecHandle, ExecEndpoint) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (control_tx, control_rx) = mpsc::channel(4);
        (
            ExecHandle {
                events: event_rx,
                control: control_tx,
            },
            ExecEndpoint {
                events: event_tx,
                control: control_rx,
            },
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub tail: Option<u32>,
    pub follow: bool,
    pub timestamps: bool,
}

/// Everything the engine needs from Docker. Implementations must be safe to call
/// concurrently; the engine never serializes access.
#[async_trait]
pub trait DockerBackend: Send + Sync {
    /// Daemon version when Docker is installed and reachable.
    async fn is_installed(&self) -> Option<String>;
    async fn needs_sudo(&self) -> bool;
    async fn disk_usage(&self) -> Result<DiskUsage>;

    async fn image_list(&self) -> Result<Vec<ImageInfo>>;
    async fn image_inspect(&self, id: &str) -> Result<Value>;
    async fn image_pull(&self, image: &str) -> Result<CommandOutput>;
    async fn image_remove(&self, id: &str, force: bool) -> Result<CommandOutput>;
    async fn image_tag(&self, source: &str, target: &str) -> Result<CommandOutput>;
    async fn image_build(
        &self,
        _context: &str,
        _tag: Option<&str>,
        _dockerfile: Option<&str>,
    ) -> Result<CommandOutput> {
        Err(DockerError::Unsupported(
            "image build is not supported by this backend".into(),
        ))
    }

    /// All containers, running or not.
    async fn container_list(&self) -> Result<Vec<ContainerInfo>>;
    async fn container_inspect(&self, id: &str) -> Result<Value>;
    async fn container_create(&self, config: &ContainerConfig) -> Result<CommandOutput>;
    /// Create and start detached.
    async fn container_run(&self, config: &ContainerConfig) -> Result<CommandOutput>;
    async fn container_start(&self, id: &str) -> Result<CommandOutput>;
    async fn container_stop(&self, id: &str, timeout: Option<u32>) -> Result<CommandOutput>;
    async fn container_restart(&self, id: &str, timeout: Option<u32>) -> Result<CommandOutput>;
    async fn container_remove(&self, id: &str, force: bool) -> Result<CommandOutput>;
    async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<CommandOutput>;
    /// Start `command` inside the container; output arrives on the handle.
    async fn container_exec(&self, id: &str, command: &str) -> Result<ExecHandle>;

    async fn network_list(&self) -> Result<Vec<NetworkInfo>>;
    async fn network_inspect(&self, id: &str) -> Result<Value>;
    async fn network_create(&self, name: &str, driver: Option<&str>) -> Result<CommandOutput>;
    async fn network_remove(&self, id: &str) -> Result<CommandOutput>;
    async fn network_prune(&self) -> Result<CommandOutput>;

    async fn volume_list(&self) -> Result<Vec<VolumeInfo>>;
    async fn volume_inspect(&self, name: &str) -> Result<Value>;
    async fn volume_create(&self, name: &str, driver: Option<&str>) -> Result<CommandOutput>;
    async fn volume_remove(&self, name: &str, force: bool) -> Result<CommandOutput>;
    async fn volume_prune(&self) -> Result<CommandOutput>;

    /// Entries of a directory inside a volume. `path` is already sanitized.
    async fn volume_dir(&self, _volume: &str, _path: &str) -> Result<Vec<VolumeEntry>> {
        Err(DockerError::Unsupported(
            "volume browsing is not supported by this backend".into(),
        ))
    }

    /// Contents of a file inside a volume (lossy UTF-8), cut off after
    /// `max_bytes + 1` bytes so callers can tell an oversized file apart.
    async fn volume_file(&self, _volume: &str, _path: &str, _max_bytes: u64) -> Result<String> {
        Err(DockerError::Unsupported(
            "volume browsing is not supported by this backend".into(),
        ))
    }
}

/// Builds the backend selected by `docker.backend`.
pub fn connect(config: &DockerConfig) -> anyhow::Result<Arc<dyn DockerBackend>> {
    match config.backend {
        BackendKind::Cli => Ok(Arc::new(CliBackend::new(config))),
        BackendKind::Http => Ok(Arc::new(HttpBackend::connect(config)?)),
    }
}

/// Docker volume names: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
pub fn validate_volume_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(DockerError::invalid(format!("invalid volume name \"{}\"", name)))
    }
}

/// Checks a value passed to docker as a positional argument. A leading `-`
/// would be parsed as a flag.
pub fn validate_operand(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DockerError::invalid(format!("{} is required", field)));
    }
    if value.starts_with('-') {
        return Err(DockerError::invalid(format!(
            "{} \"{}\" must not start with '-'",
            field, value
        )));
    }
    Ok(())
}

/// Normalizes a path inside a volume to a relative form without `.` or empty
/// components. `..` is rejected.
pub fn sanitize_volume_path(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(DockerError::invalid(format!(
                    "path \"{}\" must not contain \"..\"",
                    path
                )));
            }
            p if p.contains('\0') => {
                return Err(DockerError::invalid("path contains a NUL byte"));
            }
            p => parts.push(p),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_volume_path_normalizes() {
        assert_eq!(sanitize_volume_path("").unwrap(), "");
        assert_eq!(sanitize_volume_path("/").unwrap(), "");
        assert_eq!(sanitize_volume_path("/etc//nginx/./conf.d").unwrap(), "etc/nginx/conf.d");
    }

    #[test]
    fn sanitize_volume_path_rejects_parent() {
        let err = sanitize_volume_path("data/../../etc").unwrap_err();
        assert!(matches!(err, DockerError::InvalidConfig(_)));
    }

    #[test]
    fn volume_names_cannot_be_host_paths() {
        assert!(validate_volume_name("pgdata").is_ok());
        assert!(validate_volume_name("/etc").is_err());
        assert!(validate_volume_name("a:b").is_err());
        assert!(validate_volume_name("").is_err());
    }

    #[test]
    fn operands_cannot_look_like_flags() {
        assert!(validate_operand("id", "web").is_ok());
        assert!(validate_operand("image", "nginx:1.27").is_ok());
        assert!(validate_operand("id", "").is_err());
        let err = validate_operand("id", "--privileged").unwrap_err();
        assert!(matches!(err, DockerError::InvalidConfig(_)));
        assert!(err.to_string().contains("must not start with '-'"));
    }

    #[tokio::test]
    async fn exec_pair_connects_both_ends() {
        let (mut handle, mut endpoint) = ExecHandle::pair(8);
        endpoint.events.send(ExecEvent::Stdout("hi".into())).await.unwrap();
        handle.control.send(ExecSignal::Kill).await.unwrap();
        assert_eq!(handle.events.recv().await, Some(ExecEvent::Stdout("hi".into())));
        assert_eq!(endpoint.control.recv().await, Some(ExecSignal::Kill));
    }
}
