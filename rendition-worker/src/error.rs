use thiserror::Error;

/// Error surface of the run dispatcher.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("run task failed: {0}")]
    Join(String),

    #[error("dispatcher is shut down")]
    Shutdown,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(err: tokio::task::JoinError) -> Self {
        WorkerError::Join(err.to_string())
    }
}
