//! # S3 object store
//!
//! Media blobs live in one bucket under the keys recorded on content items.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use domains::{ObjectStore, StoreError};
use tracing::debug;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the default AWS provider chain.
    pub async fn connect(region: Option<String>, bucket: impl Into<String>) -> Self {
        let sdk = crate::aws::load_sdk_config(region).await;
        Self::new(Client::new(&sdk), bucket)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        // S3 answers 204 for a key that was never there.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(DisplayErrorContext(e).to_string()))?;
        debug!(bucket = %self.bucket, key, "object deleted");
        Ok(())
    }
}
