use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};

/// Object storage operations the stages depend on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object as UTF-8 text
    async fn get_text(&self, bucket: &str, key: &str) -> Result<String>;

    /// Write `contents` to `bucket/key`, replacing any existing object
    async fn put_text(&self, bucket: &str, key: &str, contents: &str) -> Result<()>;

    /// Server-side copy keeping the same key in the destination bucket
    async fn copy(&self, source_bucket: &str, key: &str, destination_bucket: &str) -> Result<()>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "S3 object store initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get_text(&self, bucket: &str, key: &str) -> Result<String> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                PipelineError::storage(format!("Failed to get s3://{bucket}/{key}: {e}"))
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| {
                PipelineError::storage(format!("Failed to read s3://{bucket}/{key}: {e}"))
            })?
            .into_bytes();

        debug!(size_bytes = bytes.len(), "Object downloaded");

        String::from_utf8(bytes.to_vec()).map_err(|e| {
            PipelineError::storage(format!("s3://{bucket}/{key} is not valid UTF-8: {e}"))
        })
    }

    #[instrument(skip(self, contents), fields(size_bytes = contents.len()))]
    async fn put_text(&self, bucket: &str, key: &str, contents: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(contents.as_bytes().to_vec()))
            .content_type("application/x-ndjson")
            .send()
            .await
            .map_err(|e| {
                PipelineError::storage(format!("Failed to put s3://{bucket}/{key}: {e}"))
            })?;

        debug!("Object uploaded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn copy(&self, source_bucket: &str, key: &str, destination_bucket: &str) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(copy_source(source_bucket, key))
            .bucket(destination_bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                PipelineError::storage(format!(
                    "Failed to copy s3://{source_bucket}/{key} to {destination_bucket}: {e}"
                ))
            })?;

        debug!("Object copied");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                PipelineError::storage(format!("Failed to delete s3://{bucket}/{key}: {e}"))
            })?;

        debug!("Object deleted");
        Ok(())
    }
}

/// `CopySource` value: `bucket/key` with each key segment percent-encoded
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded_key = key
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");
    format!("{bucket}/{encoded_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_source_plain_key() {
        assert_eq!(
            copy_source("data-sources", "acme/2024-01-01.jsonl"),
            "data-sources/acme/2024-01-01.jsonl"
        );
    }

    #[test]
    fn test_copy_source_keeps_empty_segments() {
        assert_eq!(copy_source("bucket", "acme//a b.jsonl"), "bucket/acme//a%20b.jsonl");
    }

    #[test]
    fn test_copy_source_encodes_special_characters() {
        assert_eq!(
            copy_source("bucket", "acme corp/año+1.jsonl"),
            "bucket/acme%20corp/a%C3%B1o%2B1.jsonl"
        );
    }
}
