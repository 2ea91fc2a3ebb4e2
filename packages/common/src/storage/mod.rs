mod error;
mod hash;
mod traits;

pub mod filesystem;

pub use error::StorageError;
pub use filesystem::FilesystemImageStore;
pub use hash::ContentHash;
pub use traits::{BoxReader, ImageStore, StoredImage};
