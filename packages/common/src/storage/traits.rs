use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;
use super::hash::ContentHash;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Result of a [`ImageStore::put`].
///
/// `newly_written` distinguishes a fresh blob from a dedup hit, so a caller
/// rolling back can tell which blobs are its own to remove.
#[derive(Debug, Clone, Copy)]
pub struct StoredImage {
    pub hash: ContentHash,
    /// `false` when identical bytes were already stored.
    pub newly_written: bool,
}

/// Content-addressed storage for uploaded banner images.
///
/// Images are small (single-digit megabytes, capped by the store), so writes
/// take the whole payload; reads stream for cheap HTTP serving.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist the image bytes.
    ///
    /// Storing the same bytes twice is a no-op returning the same hash with
    /// `newly_written = false`.
    async fn put(&self, data: &[u8]) -> Result<StoredImage, StorageError>;

    /// Open the image as a streaming reader.
    async fn open(&self, hash: &ContentHash) -> Result<BoxReader, StorageError>;

    /// Size of the stored image in bytes.
    async fn len(&self, hash: &ContentHash) -> Result<u64, StorageError>;

    /// Whether an image with this hash is stored.
    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError>;

    /// Remove the image. Returns `false` when it was already gone.
    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError>;
}
