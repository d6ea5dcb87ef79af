use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{Storage, StorageError, StorageFile, RETRY_BUDGET};

/// Filesystem-backed implementation of [`Storage`], used when no `BUCKET`
/// is configured. Writes under `base_dir`, creating parent directories as
/// needed.
pub struct LocalStorage {
    base_dir: std::path::PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    async fn put(&self, key: &str, src_path: &std::path::Path) -> Result<(), StorageError> {
        let dest = self.base_dir.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::SourceRead {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        tokio::fs::copy(src_path, &dest)
            .await
            .map_err(|source| StorageError::UploadFailed {
                key: key.to_owned(),
                message: source.to_string(),
            })?;
        Ok(())
    }

    async fn put_with_retries(&self, key: &str, src_path: &std::path::Path) -> Result<(), StorageError> {
        let mut last_error = None;
        for attempt in 0..RETRY_BUDGET {
            match self.put(key, src_path).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "local write of {} failed on attempt {}/{}: {}",
                        key,
                        attempt + 1,
                        RETRY_BUDGET,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.expect("at least one attempt was made"))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn store(&self, key: &str, src_path: &std::path::Path) {
        match self.put_with_retries(key, src_path).await {
            Ok(()) => info!("stored {} in local storage", key),
            Err(e) => error!("failed to store {} in local storage: {}", key, e),
        }
    }

    async fn store_batch(&self, files: Vec<StorageFile>) -> Result<(), StorageError> {
        let total = files.len();
        let mut failed = 0;

        for file in files {
            if self.put_with_retries(&file.key, &file.src_path).await.is_err() {
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(StorageError::BatchFailed { failed, total });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn stores_under_base_dir_creating_parents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let mut src = tempfile::NamedTempFile::new().unwrap();
        src.write_all(b"hello").unwrap();

        storage.store("nested/bafy-mobile.zip", src.path()).await;

        let written = tokio::fs::read(dir.path().join("nested/bafy-mobile.zip"))
            .await
            .unwrap();
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn store_batch_fails_loud_on_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let files = vec![StorageFile {
            key: "missing.zip".to_owned(),
            src_path: dir.path().join("does-not-exist"),
        }];

        let result = storage.store_batch(files).await;
        assert!(result.is_err());
    }
}
