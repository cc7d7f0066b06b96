//! Error taxonomy shared by every engine component.

/// Error from engine operations.
///
/// Mutating operations return these to the caller; the best-effort remote
/// push that follows a mutation logs and swallows its own errors instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No credential is available for a remote call that requires one.
    #[error("not signed in to the remote store")]
    Auth,

    /// The remote store answered with a non-success status.
    #[error("remote store error: {0}")]
    RemoteApi(String),

    /// The local storage backend failed to read or write.
    #[error("local storage error: {0}")]
    LocalIo(#[from] std::io::Error),

    /// A referenced project or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A batch sync is already running.
    #[error("a sync batch is already in progress")]
    Busy,

    /// The operation would violate a dataset invariant.
    #[error("invalid operation: {0}")]
    Validation(String),

    /// A document failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Transport errors degrade to `RemoteApi` with the failure text.
impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::RemoteApi(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
