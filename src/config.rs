use serde::Deserialize;
use std::time::Duration;

use crate::models::ContainerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub volumes: VolumesConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    /// Adapter-managed containers, started (or created) at startup.
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Max queued push messages per client before new ones are dropped.
    #[serde(default = "default_client_channel_capacity")]
    pub client_channel_capacity: usize,
}

fn default_client_channel_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Cli,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Docker CLI binary (cli backend).
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Docker API endpoint (http backend).
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Image of the throw-away container used to browse volumes.
    #[serde(default = "default_helper_image")]
    pub helper_image: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_binary() -> String {
    "docker".into()
}

fn default_helper_image() -> String {
    "alpine:3".into()
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            binary: default_binary(),
            host: None,
            port: None,
            protocol: None,
            helper_image: default_helper_image(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl DockerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// `protocol://host:port` for the http backend.
    pub fn api_url(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let port = self.port?;
        let protocol = self.protocol.as_deref().unwrap_or("http");
        Some(format!("{}://{}:{}", protocol, host, port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Window in which immediate refreshes of one key are coalesced.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Resubscribe interval announced to clients.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Clients silent for longer than this are disconnected.
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,
    /// How often to log engine stats at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_debounce_ms() -> u64 {
    1_000
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_client_timeout_secs() -> u64 {
    90
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            debounce_ms: default_debounce_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            client_timeout_secs: default_client_timeout_secs(),
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecConfig {
    /// Grace period between a graceful terminate and the forced kill.
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,
}

fn default_kill_timeout_ms() -> u64 {
    2_000
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            kill_timeout_ms: default_kill_timeout_ms(),
        }
    }
}

impl ExecConfig {
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumesConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Extensions (without dot, lowercase) that `volume:file` may read.
    #[serde(default = "default_text_extensions")]
    pub text_extensions: Vec<String>,
}

fn default_max_file_bytes() -> u64 {
    100 * 1024
}

fn default_text_extensions() -> Vec<String> {
    [
        "txt", "log", "md", "json", "yaml", "yml", "toml", "ini", "conf", "cfg", "env", "xml",
        "csv", "sh", "properties",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for VolumesConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            text_extensions: default_text_extensions(),
        }
    }
}

impl VolumesConfig {
    pub fn is_text_file(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.text_extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionsConfig {
    /// Re-list after stop/remove and fail when the target is unchanged.
    #[serde(default = "default_verify_postconditions")]
    pub verify_postconditions: bool,
}

fn default_verify_postconditions() -> bool {
    true
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            verify_postconditions: default_verify_postconditions(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        anyhow::ensure!(
            self.server.client_channel_capacity > 0,
            "server.client_channel_capacity must be > 0, got {}",
            self.server.client_channel_capacity
        );

        anyhow::ensure!(
            !self.docker.binary.is_empty(),
            "docker.binary must be non-empty"
        );
        anyhow::ensure!(
            !self.docker.helper_image.is_empty(),
            "docker.helper_image must be non-empty"
        );
        anyhow::ensure!(
            self.docker.command_timeout_secs > 0,
            "docker.command_timeout_secs must be > 0, got {}",
            self.docker.command_timeout_secs
        );
        if self.docker.backend == BackendKind::Http {
            anyhow::ensure!(
                self.docker.host.as_deref().is_some_and(|h| !h.is_empty()),
                "docker.host is required when docker.backend = \"http\""
            );
            anyhow::ensure!(
                self.docker.port.is_some_and(|p| p > 0),
                "docker.port must be between 1 and 65535 when docker.backend = \"http\""
            );
            let protocol = self.docker.protocol.as_deref().unwrap_or_default();
            anyhow::ensure!(
                protocol == "http",
                "docker.protocol must be \"http\" when docker.backend = \"http\" (TLS endpoints are not supported), got \"{}\"",
                protocol
            );
        }

        anyhow::ensure!(
            self.polling.interval_ms > 0,
            "polling.interval_ms must be > 0, got {}",
            self.polling.interval_ms
        );
        anyhow::ensure!(
            self.polling.debounce_ms > 0,
            "polling.debounce_ms must be > 0, got {}",
            self.polling.debounce_ms
        );
        anyhow::ensure!(
            self.polling.heartbeat_secs > 0,
            "polling.heartbeat_secs must be > 0, got {}",
            self.polling.heartbeat_secs
        );
        anyhow::ensure!(
            self.polling.client_timeout_secs >= self.polling.heartbeat_secs,
            "polling.client_timeout_secs must be >= polling.heartbeat_secs ({}), got {}",
            self.polling.heartbeat_secs,
            self.polling.client_timeout_secs
        );
        anyhow::ensure!(
            self.polling.stats_log_interval_secs > 0,
            "polling.stats_log_interval_secs must be > 0, got {}",
            self.polling.stats_log_interval_secs
        );

        anyhow::ensure!(
            self.exec.kill_timeout_ms > 0,
            "exec.kill_timeout_ms must be > 0, got {}",
            self.exec.kill_timeout_ms
        );
        anyhow::ensure!(
            self.volumes.max_file_bytes > 0,
            "volumes.max_file_bytes must be > 0, got {}",
            self.volumes.max_file_bytes
        );

        for (i, container) in self.containers.iter().enumerate() {
            if let Err(e) = container.validate() {
                anyhow::bail!("containers[{}] ({}): {}", i, container.name, e);
            }
        }
        Ok(())
    }
}
