// One-shot RPC requests and their normalized responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::container_config::ContainerConfig;
use super::docker::CommandOutput;

/// A request on `POST /api/command`, tagged by `command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum ActionRequest {
    #[serde(rename = "image:pull")]
    ImagePull { image: String },
    #[serde(rename = "image:inspect")]
    ImageInspect { id: String },
    #[serde(rename = "image:remove")]
    ImageRemove {
        id: String,
        #[serde(default)]
        force: bool,
    },
    #[serde(rename = "image:list")]
    ImageList,
    #[serde(rename = "image:build")]
    ImageBuild {
        /// Build context directory on the docker host.
        context: String,
        #[serde(default)]
        tag: Option<String>,
        #[serde(default)]
        dockerfile: Option<String>,
    },
    #[serde(rename = "image:tag")]
    ImageTag { source: String, target: String },

    #[serde(rename = "container:run")]
    ContainerRun { config: ContainerConfig },
    #[serde(rename = "container:create")]
    ContainerCreate { config: ContainerConfig },
    #[serde(rename = "container:stop")]
    ContainerStop {
        id: String,
        #[serde(default)]
        timeout: Option<u32>,
    },
    #[serde(rename = "container:start")]
    ContainerStart { id: String },
    #[serde(rename = "container:restart")]
    ContainerRestart {
        id: String,
        #[serde(default)]
        timeout: Option<u32>,
    },
    #[serde(rename = "container:remove")]
    ContainerRemove {
        id: String,
        #[serde(default)]
        force: bool,
    },
    #[serde(rename = "container:inspect")]
    ContainerInspect { id: String },
    #[serde(rename = "container:logs")]
    ContainerLogs {
        id: String,
        #[serde(default)]
        tail: Option<u32>,
        #[serde(default)]
        follow: bool,
        #[serde(default)]
        timestamps: bool,
    },

    #[serde(rename = "network:create")]
    NetworkCreate {
        name: String,
        #[serde(default)]
        driver: Option<String>,
    },
    #[serde(rename = "network:remove")]
    NetworkRemove { id: String },
    #[serde(rename = "network:prune")]
    NetworkPrune,

    #[serde(rename = "volume:create")]
    VolumeCreate {
        name: String,
        #[serde(default)]
        driver: Option<String>,
    },
    #[serde(rename = "volume:remove")]
    VolumeRemove {
        name: String,
        #[serde(default)]
        force: bool,
    },
    #[serde(rename = "volume:prune")]
    VolumePrune,
    /// List a directory inside a volume.
    #[serde(rename = "volume:dir")]
    VolumeDir {
        volume: String,
        #[serde(default)]
        path: String,
    },
    /// Read a text file inside a volume.
    #[serde(rename = "volume:file")]
    VolumeFile { volume: String, path: String },
}

impl ActionRequest {
    /// Wire name, e.g. `container:stop`.
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::ImagePull { .. } => "image:pull",
            ActionRequest::ImageInspect { .. } => "image:inspect",
            ActionRequest::ImageRemove { .. } => "image:remove",
            ActionRequest::ImageList => "image:list",
            ActionRequest::ImageBuild { .. } => "image:build",
            ActionRequest::ImageTag { .. } => "image:tag",
            ActionRequest::ContainerRun { .. } => "container:run",
            ActionRequest::ContainerCreate { .. } => "container:create",
            ActionRequest::ContainerStop { .. } => "container:stop",
            ActionRequest::ContainerStart { .. } => "container:start",
            ActionRequest::ContainerRestart { .. } => "container:restart",
            ActionRequest::ContainerRemove { .. } => "container:remove",
            ActionRequest::ContainerInspect { .. } => "container:inspect",
            ActionRequest::ContainerLogs { .. } => "container:logs",
            ActionRequest::NetworkCreate { .. } => "network:create",
            ActionRequest::NetworkRemove { .. } => "network:remove",
            ActionRequest::NetworkPrune => "network:prune",
            ActionRequest::VolumeCreate { .. } => "volume:create",
            ActionRequest::VolumeRemove { .. } => "volume:remove",
            ActionRequest::VolumePrune => "volume:prune",
            ActionRequest::VolumeDir { .. } => "volume:dir",
            ActionRequest::VolumeFile { .. } => "volume:file",
        }
    }

    /// Whether the action changes daemon state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            ActionRequest::ImageInspect { .. }
                | ActionRequest::ImageList
                | ActionRequest::ContainerInspect { .. }
                | ActionRequest::ContainerLogs { .. }
                | ActionRequest::VolumeDir { .. }
                | ActionRequest::VolumeFile { .. }
        )
    }
}

/// Either a structured `{result}` or the CLI-shaped `{stdout, stderr}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionResponse {
    Result { result: Value },
    Output(CommandOutput),
}

impl ActionResponse {
    pub fn result(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(result) => ActionResponse::Result { result },
            Err(e) => Self::failure(e.to_string()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ActionResponse::Output(CommandOutput::failure(message))
    }

    /// The stderr text of a failed action (empty stdout, non-empty stderr).
    pub fn error(&self) -> Option<&str> {
        match self {
            ActionResponse::Output(out) if out.stdout.is_empty() && !out.stderr.is_empty() => {
                Some(out.stderr.as_str())
            }
            _ => None,
        }
    }
}

impl From<CommandOutput> for ActionResponse {
    fn from(output: CommandOutput) -> Self {
        ActionResponse::Output(output)
    }
}
