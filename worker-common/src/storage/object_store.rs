use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{error, info, warn};

use super::{Storage, StorageError, StorageFile, RETRY_BUDGET};

/// Object-store backed implementation of [`Storage`], keyed under an
/// optional `prefix` (`{prefix}/{key}`, or bare `key` when unset).
pub struct ObjectStorage {
    client: S3Client,
    bucket: String,
    prefix: Option<String>,
}

impl ObjectStorage {
    pub fn new(client: S3Client, bucket: String, prefix: Option<String>) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    fn effective_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{key}"),
            _ => key.to_owned(),
        }
    }

    async fn put(&self, key: &str, src_path: &std::path::Path) -> Result<(), StorageError> {
        let body = ByteStream::from_path(src_path)
            .await
            .map_err(|source| StorageError::SourceRead {
                path: src_path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, source),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.effective_key(key))
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed {
                key: key.to_owned(),
                message: e.to_string(),
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
                        "upload of {} failed on attempt {}/{}: {}",
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
impl Storage for ObjectStorage {
    async fn store(&self, key: &str, src_path: &std::path::Path) {
        match self.put_with_retries(key, src_path).await {
            Ok(()) => info!("stored {} in object storage", key),
            Err(e) => error!("failed to store {} in object storage: {}", key, e),
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
