use bpm_core::BlobError;

/// Failure reported by the host's record source or entity store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Transport or server failure.
    #[error("storage backend failed: {0}")]
    Backend(String),
    /// The store refused the request (validation, access rights).
    #[error("storage rejected the request: {0}")]
    Rejected(String),
    /// `create` returned a different number of ids than rows sent.
    #[error("store created {got} row(s), expected {expected}")]
    CountMismatch { expected: usize, got: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("row encoding failed: {0}")]
    Row(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid editor options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}
