// Docker object listings as pushed to UI clients

use serde::{Deserialize, Serialize};

/// Docker container state; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from Docker state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    /// States in which processes may still be executing.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ContainerState::Running | ContainerState::Paused | ContainerState::Restarting
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub created_at: String,
    /// Human status text, e.g. "Up 3 hours".
    #[serde(default)]
    pub status: String,
    pub state: ContainerState,
    #[serde(default)]
    pub ports: String,
    #[serde(default)]
    pub labels: String,
}

/// Looks `reference` up the way the daemon does: full id, then name, then an id
/// prefix no other entry shares.
fn resolve<'a, T>(
    items: &'a [T],
    reference: &str,
    id: impl Fn(&T) -> &str,
    named: impl Fn(&T, &str) -> bool,
) -> Option<&'a T> {
    if reference.is_empty() {
        return None;
    }
    items
        .iter()
        .find(|item| id(*item) == reference)
        .or_else(|| items.iter().find(|item| named(*item, reference)))
        .or_else(|| {
            let mut prefixed = items.iter().filter(|item| id(*item).starts_with(reference));
            match (prefixed.next(), prefixed.next()) {
                (Some(only), None) => Some(only),
                _ => None,
            }
        })
}

impl ContainerInfo {
    pub fn resolve<'a>(containers: &'a [ContainerInfo], reference: &str) -> Option<&'a ContainerInfo> {
        resolve(
            containers,
            reference.trim_start_matches('/'),
            |c| c.id.as_str(),
            |c, name| c.name == name,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub id: String,
    pub repository: String,
    pub tag: String,
    #[serde(default)]
    pub created_at: String,
    pub size: u64,
}

impl ImageInfo {
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// A bare repository refers to its `latest` tag.
    pub fn resolve<'a>(images: &'a [ImageInfo], reference: &str) -> Option<&'a ImageInfo> {
        resolve(
            images,
            reference.trim_start_matches("sha256:"),
            |i| i.id.trim_start_matches("sha256:"),
            |i, name| i.reference() == name || (i.tag == "latest" && i.repository == name),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub scope: String,
}

impl NetworkInfo {
    pub fn resolve<'a>(networks: &'a [NetworkInfo], reference: &str) -> Option<&'a NetworkInfo> {
        resolve(networks, reference, |n| n.id.as_str(), |n, name| n.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default)]
    pub scope: String,
}

/// One row of `docker system df`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total_count: u64,
    pub active: u64,
    pub size: u64,
    pub reclaimable: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotal {
    pub size: u64,
    pub reclaimable: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub images: UsageSummary,
    pub containers: UsageSummary,
    pub volumes: UsageSummary,
    pub build_cache: UsageSummary,
    pub total: UsageTotal,
}

impl DiskUsage {
    /// Recomputes `total` from the four categories.
    pub fn with_total(mut self) -> Self {
        let rows = [&self.images, &self.containers, &self.volumes, &self.build_cache];
        self.total = UsageTotal {
            size: rows.iter().map(|r| r.size).sum(),
            reclaimable: rows.iter().map(|r| r.reclaimable).sum(),
        };
        self
    }
}

/// Normalized result of a one-shot action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout(s: impl Into<String>) -> Self {
        Self {
            stdout: s.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One directory entry inside a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Seconds since the epoch.
    pub modified: u64,
}
