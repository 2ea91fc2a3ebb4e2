use thiserror::Error;

/// Errors raised by the image blob store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No image with this content hash.
    #[error("image not found: {0}")]
    NotFound(String),
    /// The payload exceeds the configured size cap.
    #[error("image exceeds size limit ({actual} > {limit} bytes)")]
    TooLarge { actual: u64, limit: u64 },
    /// The given content hash string is not a valid SHA-256 hex digest.
    #[error("invalid content hash: {0}")]
    InvalidHash(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}
