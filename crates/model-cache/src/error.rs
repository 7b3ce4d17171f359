use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted cache: {0}")]
    Corrupted(String),

    #[error("Cache version mismatch: {0}")]
    VersionMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Wraps an IO error with the path it happened on.
pub fn io_error_at(action: &str, path: &Path, error: std::io::Error) -> CacheError {
    CacheError::Io(std::io::Error::new(
        error.kind(),
        format!("failed to {action} {}: {error}", path.display()),
    ))
}
