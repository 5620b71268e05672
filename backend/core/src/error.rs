use thiserror::Error;

/// Top-level error type for the VoxRank runtime.
#[derive(Debug, Error)]
pub enum VoxError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("external collaborator failed: {0}")]
    External(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
