use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{
    errors::StorageResult,
    models::{ListOptions, ObjectPage, StoredObject, StoredObjectBody, UploadOptions},
};

/// Port for key-addressed blob storage
/// This abstracts the bucket binding (R2, in-memory, ...)
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    /// Store `data` under `key`, replacing any existing object
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<StoredObject>;

    /// Fetch an object with its body; `None` when the key does not exist
    async fn download(&self, key: &str) -> StorageResult<Option<StoredObjectBody>>;

    /// Delete an object; deleting a missing key succeeds
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Return one page of objects in key order
    async fn list(&self, options: ListOptions) -> StorageResult<ObjectPage>;

    /// Fetch metadata only; `None` when the key does not exist
    async fn head(&self, key: &str) -> StorageResult<Option<StoredObject>>;

    /// Check for an object without reading its body
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.head(key).await?.is_some())
    }
}
