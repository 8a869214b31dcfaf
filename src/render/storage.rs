use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("S3 bucket {0} unavailable")]
    BucketUnavailable(String),
    #[error("AWS SDK error: {0}")]
    AwsSdk(#[from] color_eyre::Report),
}

/// Blob storage for rendered sign assets. `put` overwrites on conflict,
/// which makes per-token retries idempotent.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError>;
    fn public_url(&self, key: &str) -> String;
}

/// S3-backed blob store.
pub struct AwsS3Blobs {
    client: S3Client,
    bucket: String,
    public_base_url: String,
    bucket_exists: AtomicBool,
}

impl AwsS3Blobs {
    pub fn new(
        config: &SdkConfig,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: S3Client::new(config),
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
            bucket_exists: AtomicBool::new(false),
        }
    }

    // Helper function to ensure the S3 bucket exists before any operation
    async fn ensure_bucket_exists(&self) -> Result<(), BlobError> {
        use aws_sdk_s3::error::SdkError;

        // return if bucket is already verified
        if self.bucket_exists.load(Ordering::Relaxed) {
            return Ok(());
        }

        const MAX_RETRIES: u32 = 3;
        const RETRY_DELAY: Duration = Duration::from_millis(500);

        for attempt in 0..MAX_RETRIES {
            match self.client.head_bucket().bucket(&self.bucket).send().await {
                Ok(_) => {
                    self.bucket_exists.store(true, Ordering::Relaxed);
                    return Ok(());
                }
                Err(SdkError::ServiceError(err)) if err.err().is_not_found() => {
                    match self
                        .client
                        .create_bucket()
                        .bucket(&self.bucket)
                        .send()
                        .await
                    {
                        Ok(_) => {
                            info!("Bucket {} created successfully", self.bucket);
                            self.bucket_exists.store(true, Ordering::Relaxed);
                            return Ok(());
                        }
                        Err(create_err) => {
                            if attempt == MAX_RETRIES - 1 {
                                return Err(BlobError::AwsSdk(create_err.into()));
                            }
                            warn!(
                                "Failed to create bucket {}: {create_err}. Retrying...",
                                self.bucket
                            );
                        }
                    }
                }
                Err(err) => {
                    if attempt == MAX_RETRIES - 1 {
                        return Err(BlobError::AwsSdk(err.into()));
                    }
                    warn!("Error checking bucket {}: {err}. Retrying...", self.bucket);
                }
            }

            if attempt < MAX_RETRIES - 1 {
                sleep(RETRY_DELAY).await;
            }
        }
        Err(BlobError::BucketUnavailable(self.bucket.clone()))
    }
}

#[async_trait]
impl BlobStore for AwsS3Blobs {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        self.ensure_bucket_exists().await?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("image/png")
            .body(data.into())
            .send()
            .await
            .map_err(|e| BlobError::AwsSdk(e.into()))?;

        info!("Stored asset {key} in bucket {}", self.bucket);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url.trim_end_matches('/'))
    }
}

/// In-memory blob store used by tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    pub objects: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        self.objects.write().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}
