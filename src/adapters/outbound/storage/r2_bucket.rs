use object_store::{aws::AmazonS3Builder, memory::InMemory, ObjectStore};
use std::sync::Arc;
use tracing::info;

use crate::domain::{
    errors::{StorageError, StorageResult},
    value_objects::BucketName,
};

/// Bucket binding: a named handle on an object store
///
/// Cloning shares the store, so every request context built from the same
/// binding sees the same objects.
#[derive(Clone)]
pub struct R2Bucket {
    name: String,
    account_id: Option<String>,
    store: Arc<dyn ObjectStore>,
}

impl R2Bucket {
    /// Process-local bucket backed by `object_store::memory::InMemory`
    pub fn in_memory() -> Self {
        Self::from_store("memory", Arc::new(InMemory::new()))
    }

    /// Bucket on Cloudflare R2 through its S3-compatible endpoint
    pub fn r2(
        account_id: &str,
        bucket: &BucketName,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> StorageResult<Self> {
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", account_id);

        let store = AmazonS3Builder::new()
            .with_endpoint(&endpoint)
            .with_region("auto")
            .with_bucket_name(bucket.as_str())
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .build()
            .map_err(|e| StorageError::InvalidBucketConfig {
                message: e.to_string(),
            })?;

        info!(bucket = %bucket, endpoint = %endpoint, "Configured R2 bucket");

        Ok(Self {
            name: bucket.as_str().to_string(),
            account_id: Some(account_id.to_string()),
            store: Arc::new(store),
        })
    }

    /// Wrap any `object_store` implementation
    pub fn from_store(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            account_id: None,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub(crate) fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

impl std::fmt::Debug for R2Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Bucket")
            .field("name", &self.name)
            .field("account_id", &self.account_id)
            .field("store", &self.store.to_string())
            .finish()
    }
}
