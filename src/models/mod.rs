// Wire and domain models

mod action;
mod container_config;
mod docker;
mod message;
mod topic;

pub use action::{ActionRequest, ActionResponse};
pub use container_config::{
    CommandSpec, ContainerConfig, KeyValues, LoggingConfig, MountSpec, MountType, PortMapping,
    PortProtocol, ResourceLimits, RestartPolicy, RestartPolicyName, SecurityOptions, parse_memory,
};
pub use docker::{
    CommandOutput, ContainerInfo, ContainerState, DiskUsage, EntryKind, ImageInfo, NetworkInfo,
    UsageSummary, UsageTotal, VolumeEntry, VolumeInfo,
};
pub use message::{EngineInfo, ExecOutput, PushMessage};
pub use topic::{ClientId, ExecIntent, SubscribeReply, SubscribeRequest, Topic, TopicKind};
