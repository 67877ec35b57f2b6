use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::errors::{StorageError, StorageResult};

/// Largest page a single list call returns
pub const MAX_LIST_LIMIT: usize = 1000;

/// Transport-level metadata stored with an object and replayed as HTTP headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

impl HttpMetadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Options accepted by an upload
///
/// `content_type` is a shorthand that wins over `http_metadata.content_type`.
/// `custom_metadata` is kept separate from the HTTP metadata.
#[derive(Debug, Clone, Default, PartialEq, bon::Builder)]
pub struct UploadOptions {
    #[builder(into)]
    pub content_type: Option<String>,
    pub http_metadata: Option<HttpMetadata>,
    pub custom_metadata: Option<HashMap<String, String>>,
}

impl UploadOptions {
    /// HTTP metadata with the content-type shorthand applied
    pub fn effective_http_metadata(&self) -> HttpMetadata {
        let mut metadata = self.http_metadata.clone().unwrap_or_default();
        if let Some(content_type) = &self.content_type {
            metadata.content_type = Some(content_type.clone());
        }
        metadata
    }
}

/// Descriptor of a stored object, without its body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub version: Option<String>,
    pub uploaded: DateTime<Utc>,
    pub http_metadata: HttpMetadata,
    pub custom_metadata: HashMap<String, String>,
}

/// A stored object together with its not-yet-read body
pub struct StoredObjectBody {
    pub object: StoredObject,
    body: BoxStream<'static, StorageResult<Bytes>>,
}

impl StoredObjectBody {
    pub fn new(object: StoredObject, body: BoxStream<'static, StorageResult<Bytes>>) -> Self {
        Self { object, body }
    }

    /// Read the whole body into memory
    pub async fn bytes(mut self) -> StorageResult<Bytes> {
        let mut buffer = BytesMut::with_capacity(self.object.size as usize);
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Read the body as UTF-8 text, replacing invalid sequences
    pub async fn text(self) -> StorageResult<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> StorageResult<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(StorageError::from)
    }

    pub fn into_stream(self) -> BoxStream<'static, StorageResult<Bytes>> {
        self.body
    }
}

impl std::fmt::Debug for StoredObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObjectBody")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

/// Listing parameters; the cursor is the opaque value returned by the previous page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectPage {
    pub objects: Vec<StoredObject>,
    pub truncated: bool,
    pub cursor: Option<String>,
}
