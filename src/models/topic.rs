// Subscription topics and the subscribe handshake

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of one connected UI client.
pub type ClientId = String;

/// Topic names as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Info,
    Images,
    Containers,
}

/// What a client currently wants to see. One per client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Info,
    Images,
    Containers,
    /// Inspection data of one container.
    Container(String),
}

impl Topic {
    pub fn kind(&self) -> TopicKind {
        match self {
            Topic::Info => TopicKind::Info,
            Topic::Images => TopicKind::Images,
            Topic::Containers | Topic::Container(_) => TopicKind::Containers,
        }
    }
}

impl From<TopicKind> for Topic {
    fn from(kind: TopicKind) -> Self {
        match kind {
            TopicKind::Info => Topic::Info,
            TopicKind::Images => Topic::Images,
            TopicKind::Containers => Topic::Containers,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Info => write!(f, "info"),
            Topic::Images => write!(f, "images"),
            Topic::Containers => write!(f, "containers"),
            Topic::Container(id) => write!(f, "container:{}", id),
        }
    }
}

/// Client -> server subscribe message. Also carries the exec sub-protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(rename = "type")]
    pub kind: TopicKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminate: bool,
}

/// Exec action piggybacked on a `containers` subscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecIntent {
    Start { container: String, command: String },
    Terminate { container: String },
}

impl SubscribeRequest {
    pub fn new(kind: TopicKind) -> Self {
        Self {
            kind,
            container: None,
            command: None,
            terminate: false,
        }
    }

    pub fn container(id: impl Into<String>) -> Self {
        Self {
            container: Some(id.into()),
            ..Self::new(TopicKind::Containers)
        }
    }

    fn container_id(&self) -> Option<&str> {
        self.container.as_deref().filter(|c| !c.is_empty())
    }

    /// `{type: containers, container: id}` watches that one container.
    pub fn topic(&self) -> Topic {
        match (self.kind, self.container_id()) {
            (TopicKind::Containers, Some(id)) => Topic::Container(id.to_string()),
            (kind, _) => kind.into(),
        }
    }

    pub fn exec_intent(&self) -> Option<ExecIntent> {
        if self.kind != TopicKind::Containers {
            return None;
        }
        let container = self.container_id()?.to_string();
        if self.terminate {
            return Some(ExecIntent::Terminate { container });
        }
        self.command.as_ref().map(|command| ExecIntent::Start {
            container,
            command: command.clone(),
        })
    }
}

/// Server -> client answer to a subscribe message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeReply {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resubscribe interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<u64>,
}

impl SubscribeReply {
    pub fn accepted(heartbeat_ms: u64) -> Self {
        Self {
            accepted: true,
            error: None,
            heartbeat: Some(heartbeat_ms),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(error.into()),
            heartbeat: None,
        }
    }
}
