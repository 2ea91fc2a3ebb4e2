use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufReader;

use super::error::StorageError;
use super::hash::ContentHash;
use super::traits::{BoxReader, ImageStore, StoredImage};

/// Filesystem-backed image store.
///
/// Blobs live in a sharded layout, `{root}/{first 2 hex chars}/{remaining 62}`,
/// and are written via a temp file + rename so readers never observe a
/// partially written image.
pub struct FilesystemImageStore {
    root: PathBuf,
    max_size: u64,
}

impl FilesystemImageStore {
    pub async fn new(root: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(".tmp")).await?;
        Ok(Self { root, max_size })
    }

    fn image_path(&self, hash: &ContentHash) -> PathBuf {
        let (shard, name) = hash.shard();
        self.root.join(shard).join(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(".tmp").join(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl ImageStore for FilesystemImageStore {
    async fn put(&self, data: &[u8]) -> Result<StoredImage, StorageError> {
        if data.len() as u64 > self.max_size {
            return Err(StorageError::TooLarge {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let hash = ContentHash::compute(data);
        let image_path = self.image_path(&hash);

        // Content-addressed: identical bytes are already on disk.
        if fs::try_exists(&image_path).await? {
            return Ok(StoredImage {
                hash,
                newly_written: false,
            });
        }

        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Some(parent) = image_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Err(e) = fs::rename(&temp_path, &image_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(StoredImage {
            hash,
            newly_written: true,
        })
    }

    async fn open(&self, hash: &ContentHash) -> Result<BoxReader, StorageError> {
        match fs::File::open(self.image_path(hash)).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn len(&self, hash: &ContentHash) -> Result<u64, StorageError> {
        match fs::metadata(self.image_path(hash)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.image_path(hash)).await?)
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        match fs::remove_file(self.image_path(hash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
