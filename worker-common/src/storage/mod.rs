//! C2: the storage abstraction. Two backends (S3-compatible object store or
//! local filesystem) behind one contract, selected once at process start.

mod local;
mod object_store;

pub use local::LocalStorage;
pub use object_store::ObjectStorage;

use async_trait::async_trait;

use crate::error::StorageError;

/// A single file queued for a batch upload.
pub struct StorageFile {
    pub key: String,
    pub src_path: std::path::PathBuf,
}

/// The contract every storage backend implements. `store` is best-effort per
/// file and logs rather than failing the caller in single-file mode;
/// `store_batch` is atomic with respect to success reporting.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Upload/copy `src_path` under `key`. Retries transient failures up to
    /// three times; logs on both success and final failure but never
    /// returns an error.
    async fn store(&self, key: &str, src_path: &std::path::Path);

    /// Upload every file in `files`, retrying each up to three times. If any
    /// file permanently fails, the whole batch is reported as failed.
    async fn store_batch(&self, files: Vec<StorageFile>) -> Result<(), StorageError>;
}

const RETRY_BUDGET: usize = 3;
