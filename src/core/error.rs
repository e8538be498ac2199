use thiserror::Error;

/// Failure taxonomy shared by gateways and domain stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The remote store was never configured for this process.
    #[error("Remote store is not configured")]
    RemoteUnavailable,

    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote store refused a write (constraint, policy or payload failure).
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// A local pre-submit check failed; nothing was sent to the remote store.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error: {0}")]
    Query(String),

    /// Catch-all for network and decoding failures.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SyncError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short, stable name of the failure kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteUnavailable => "remote_unavailable",
            Self::NotFound(_) => "not_found",
            Self::WriteRejected(_) => "write_rejected",
            Self::Validation(_) => "validation",
            Self::Query(_) => "query",
            Self::Transport(_) => "transport",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("malformed payload: {err}"))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(format!("I/O error: {err}"))
    }
}
