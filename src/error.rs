// Engine error taxonomy. Everything crossing the RPC or push boundary is rendered
// through Display, so messages are written for the UI.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    /// Docker binary missing or daemon unreachable.
    #[error("Docker is not installed or the daemon is not reachable")]
    BackendUnavailable,

    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    /// The target is still running after an action that should have stopped it.
    #[error("{0}")]
    StillActive(String),

    /// The backend accepted the action but a re-listing shows it had no effect.
    #[error("{0}")]
    PostconditionFailed(String),

    #[error("cannot start process: {0}")]
    ProcessSpawn(String),

    #[error("docker {command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("docker command timed out after {0:?}")]
    Timeout(Duration),

    #[error("docker API error: {0}")]
    Api(bollard::errors::Error),

    #[error("unexpected docker output: {0}")]
    Parse(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("not ready")]
    NotReady,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DockerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DockerError::InvalidConfig(vec![message.into()])
    }

}

/// An API 404 reads the same as the CLI's "No such ..." failure.
impl From<bollard::errors::Error> for DockerError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => DockerError::NotFound(message),
            other => DockerError::Api(other),
        }
    }
}

impl From<serde_json::Error> for DockerError {
    fn from(e: serde_json::Error) -> Self {
        DockerError::Parse(e.to_string())
    }
}
