use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use std::sync::Arc;
use uuid::Uuid;

use crate::extractor::AudioArtifact;
use crate::PipelineError;

/// Temporary object store used as a hand-off buffer between audio extraction
/// and the transcription service
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into())
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload object to S3")?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete object from S3")?;

        Ok(())
    }
}

/// Handle to an audio artifact resident in temporary storage.
///
/// Every staged object must be released exactly once; the pipeline owns that
/// obligation on all exit paths. A handle dropped without release logs the
/// leaked key so operators can reconcile.
#[derive(Debug)]
pub struct StagedAudio {
    /// Remote object key
    pub key: String,

    /// URI the transcription service reads the object from
    pub uri: String,

    /// Media format identifier for the transcription job
    pub media_format: &'static str,

    released: bool,
}

impl Drop for StagedAudio {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Staged object was never released, leaking key: {}", self.key);
        }
    }
}

#[cfg(test)]
impl StagedAudio {
    /// Handle fabricated outside the lifecycle manager, for tests only
    pub(crate) fn test_handle(key: &str, uri: &str, media_format: &'static str) -> Self {
        Self {
            key: key.to_string(),
            uri: uri.to_string(),
            media_format,
            released: true,
        }
    }
}

/// Stages audio artifacts in temporary storage and guarantees their removal
/// once the transcription job no longer needs them.
pub struct StorageLifecycleManager {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key_prefix: String,
}

impl StorageLifecycleManager {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, key_prefix: Option<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key_prefix: key_prefix.unwrap_or_default(),
        }
    }

    /// Upload the artifact and return the staging handle.
    ///
    /// Upload failure is fatal ([`PipelineError::Staging`]).
    pub async fn stage(&self, artifact: &AudioArtifact) -> Result<StagedAudio> {
        let key = format!(
            "{}audio_{}_{}.{}",
            self.key_prefix,
            Uuid::new_v4(),
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            artifact.format.as_str()
        );

        tracing::info!("Uploading audio to s3://{}/{}", self.bucket, key);

        let content = fs_err::read(&artifact.path)
            .map_err(|e| PipelineError::Staging(e.to_string()))?;

        self.store
            .put(&key, content, artifact.format.mime_type())
            .await
            .map_err(|e| PipelineError::Staging(e.to_string()))?;

        Ok(StagedAudio {
            uri: format!("s3://{}/{}", self.bucket, key),
            media_format: artifact.format.media_format(),
            key,
            released: false,
        })
    }

    /// Delete the remote object unconditionally.
    ///
    /// Delete failures are logged and treated as non-fatal leaks; blocking the
    /// run on cleanup failure would be a worse outcome.
    pub async fn release(&self, mut staged: StagedAudio) {
        match self.store.delete(&staged.key).await {
            Ok(()) => {
                tracing::debug!("Released staged object: {}", staged.key);
            }
            Err(e) => {
                tracing::warn!("Failed to delete staged object {} (leaked): {}", staged.key, e);
            }
        }

        // The delete was attempted; the obligation is discharged either way.
        staged.released = true;
    }
}
