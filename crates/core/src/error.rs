use thiserror::Error;

/// Failures of one adapter operation. None of them is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Provider block problem (offline mode, missing client, wrong provider data).
    #[error("configuration: {0}")]
    Configuration(String),
    /// Local JSON/YAML encode or decode failure.
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("apply failed: {0}")]
    ApplyFailed(String),
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
    #[error("import failed: {0}")]
    ImportFailed(String),
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("timed out after {timeout_secs}s waiting for {json_path} == {expected:?}")]
    WaitTimedOut { json_path: String, expected: String, timeout_secs: u64 },
}

impl AdapterError {
    /// GET/PATCH/DELETE failures reported by the client or the API server.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::ApplyFailed(_) | Self::ReadFailed(_) | Self::DeleteFailed(_))
    }

    pub fn serialization(e: impl std::fmt::Display) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
