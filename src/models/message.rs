// Server -> client push messages. Every push is a full-state replacement
// except exec output, which is cumulative per message.

use serde::{Deserialize, Serialize};

use super::docker::{ContainerInfo, DiskUsage, ImageInfo};
use super::topic::Topic;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInfo {
    pub needs_sudo: bool,
    pub disk_usage: DiskUsage,
}

/// Accumulated output of one exec session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum PushMessage {
    Info {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<EngineInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Images {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Vec<ImageInfo>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Containers {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Vec<ContainerInfo>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Container {
        container: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Cumulative exec output so far.
    Exec { container: String, data: ExecOutput },
    /// Final exec message; `data.code` carries the exit code.
    Stopped { container: String, data: ExecOutput },
}

impl PushMessage {
    /// Error-carrying push for a topic (no data).
    pub fn error_for(topic: &Topic, error: impl Into<String>) -> Self {
        let error = Some(error.into());
        match topic {
            Topic::Info => PushMessage::Info {
                data: None,
                error,
                version: None,
            },
            Topic::Images => PushMessage::Images { data: None, error },
            Topic::Containers => PushMessage::Containers { data: None, error },
            Topic::Container(id) => PushMessage::Container {
                container: id.clone(),
                data: None,
                error,
            },
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PushMessage::Info { error, .. }
            | PushMessage::Images { error, .. }
            | PushMessage::Containers { error, .. }
            | PushMessage::Container { error, .. } => error.as_deref(),
            PushMessage::Exec { .. } | PushMessage::Stopped { .. } => None,
        }
    }
}
