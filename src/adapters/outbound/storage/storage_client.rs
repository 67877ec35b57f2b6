use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use object_store::{
    path::Path as ObjectPath, Attribute, AttributeValue, Attributes, GetOptions, ObjectMeta,
    PutOptions, PutPayload,
};
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::r2_bucket::R2Bucket;
use crate::{
    domain::{
        errors::{StorageError, StorageResult},
        models::{
            HttpMetadata, ListOptions, ObjectPage, StoredObject, StoredObjectBody, UploadOptions,
            MAX_LIST_LIMIT,
        },
        value_objects::ObjectKey,
    },
    ports::storage::ObjectStorage,
};

/// Thin typed wrapper over a bucket binding
#[derive(Clone, Debug)]
pub struct StorageClient {
    bucket: R2Bucket,
}

/// Wrap a bucket binding in a storage client
pub fn create_storage(bucket: &R2Bucket) -> StorageClient {
    StorageClient {
        bucket: bucket.clone(),
    }
}

/// Public object URL: `https://{bucket}.{account}.r2.cloudflarestorage.com/{key}`
///
/// Nothing is validated; the URL only resolves if the bucket is publicly readable.
pub fn public_url(account_id: &str, bucket_name: &str, key: &str) -> String {
    format!(
        "https://{}.{}.r2.cloudflarestorage.com/{}",
        bucket_name, account_id, key
    )
}

impl StorageClient {
    pub fn bucket(&self) -> &R2Bucket {
        &self.bucket
    }

    fn path_for(key: &str) -> StorageResult<ObjectPath> {
        let key = ObjectKey::new(key).map_err(|reason| StorageError::InvalidKey {
            key: key.to_string(),
            reason,
        })?;

        let path = ObjectPath::parse(key.as_str()).map_err(|e| StorageError::UnsupportedKey {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        // the path encoding normalises some keys (e.g. a trailing '/')
        if path.as_ref() != key.as_str() {
            return Err(StorageError::UnsupportedKey {
                key: key.into_string(),
                message: "key does not survive path normalisation".to_string(),
            });
        }

        Ok(path)
    }
}

fn to_attributes(options: &UploadOptions) -> Attributes {
    let http = options.effective_http_metadata();
    let mut attributes = Attributes::new();

    let headers = [
        (Attribute::ContentType, http.content_type),
        (Attribute::ContentLanguage, http.content_language),
        (Attribute::ContentDisposition, http.content_disposition),
        (Attribute::ContentEncoding, http.content_encoding),
        (Attribute::CacheControl, http.cache_control),
    ];
    for (attribute, value) in headers {
        if let Some(value) = value {
            attributes.insert(attribute, AttributeValue::from(value));
        }
    }

    if let Some(custom) = &options.custom_metadata {
        for (name, value) in custom {
            attributes.insert(
                Attribute::Metadata(name.clone().into()),
                AttributeValue::from(value.clone()),
            );
        }
    }

    attributes
}

fn from_attributes(attributes: &Attributes) -> (HttpMetadata, HashMap<String, String>) {
    let mut http = HttpMetadata::default();
    let mut custom = HashMap::new();

    for (attribute, value) in attributes.iter() {
        let value = value.to_string();
        match attribute {
            Attribute::ContentType => http.content_type = Some(value),
            Attribute::ContentLanguage => http.content_language = Some(value),
            Attribute::ContentDisposition => http.content_disposition = Some(value),
            Attribute::ContentEncoding => http.content_encoding = Some(value),
            Attribute::CacheControl => http.cache_control = Some(value),
            Attribute::Metadata(name) => {
                custom.insert(name.to_string(), value);
            }
            _ => {}
        }
    }

    (http, custom)
}

fn to_stored_object(meta: &ObjectMeta, attributes: Option<&Attributes>) -> StoredObject {
    let (http_metadata, custom_metadata) = attributes.map(from_attributes).unwrap_or_default();

    StoredObject {
        key: meta.location.as_ref().to_string(),
        size: meta.size,
        etag: meta.e_tag.clone(),
        version: meta.version.clone(),
        uploaded: meta.last_modified,
        http_metadata,
        custom_metadata,
    }
}

fn encode_cursor(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

fn decode_cursor(cursor: &str) -> StorageResult<String> {
    let raw = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| StorageError::InvalidCursor)?;
    String::from_utf8(raw).map_err(|_| StorageError::InvalidCursor)
}

fn not_found(error: &object_store::Error) -> bool {
    matches!(error, object_store::Error::NotFound { .. })
}

#[async_trait]
impl ObjectStorage for StorageClient {
    #[instrument(skip(self, data, options), fields(bucket = %self.bucket.name(), size = data.len()))]
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<StoredObject> {
        let path = Self::path_for(key)?;
        let size = data.len() as u64;

        let put_options = PutOptions {
            attributes: to_attributes(&options),
            ..Default::default()
        };

        let result = self
            .bucket
            .store()
            .put_opts(&path, PutPayload::from(data), put_options)
            .await
            .map_err(|e| StorageError::backend("upload", e))?;

        debug!(key = %key, "Uploaded object");

        Ok(StoredObject {
            key: key.to_string(),
            size,
            etag: result.e_tag,
            version: result.version,
            uploaded: Utc::now(),
            http_metadata: options.effective_http_metadata(),
            custom_metadata: options.custom_metadata.unwrap_or_default(),
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket.name()))]
    async fn download(&self, key: &str) -> StorageResult<Option<StoredObjectBody>> {
        let path = Self::path_for(key)?;

        let result = match self.bucket.store().get_opts(&path, GetOptions::default()).await {
            Ok(result) => result,
            Err(e) if not_found(&e) => return Ok(None),
            Err(e) => return Err(StorageError::backend("download", e)),
        };

        let object = to_stored_object(&result.meta, Some(&result.attributes));
        let body = result
            .into_stream()
            .map_err(|e| StorageError::backend("download", e))
            .boxed();

        Ok(Some(StoredObjectBody::new(object, body)))
    }

    #[instrument(skip(self), fields(bucket = %self.bucket.name()))]
    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = Self::path_for(key)?;

        match self.bucket.store().delete(&path).await {
            Ok(()) => Ok(()),
            Err(e) if not_found(&e) => Ok(()),
            Err(e) => Err(StorageError::backend("remove", e)),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket.name()))]
    async fn list(&self, options: ListOptions) -> StorageResult<ObjectPage> {
        let limit = options.limit.unwrap_or(MAX_LIST_LIMIT);
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(StorageError::InvalidListLimit {
                limit,
                max: MAX_LIST_LIMIT,
            });
        }

        let prefix = options.prefix.unwrap_or_default();
        let after = options.cursor.as_deref().map(decode_cursor).transpose()?;

        // object_store prefixes match whole segments; list the enclosing
        // directory and filter on the raw string instead
        let root = match prefix.rfind('/') {
            Some(idx) => match ObjectPath::parse(&prefix[..idx]) {
                Ok(path) => Some(path),
                Err(_) => {
                    return Ok(ObjectPage {
                        objects: Vec::new(),
                        truncated: false,
                        cursor: None,
                    })
                }
            },
            None => None,
        };

        let store = self.bucket.store();
        let listing = match &after {
            Some(after) => {
                let offset = ObjectPath::parse(after).map_err(|_| StorageError::InvalidCursor)?;
                store.list_with_offset(root.as_ref(), &offset)
            }
            None => store.list(root.as_ref()),
        };

        // Listings come back in key order, so the matching keys are contiguous
        let prefix = prefix.as_str();
        let mut metas: Vec<ObjectMeta> = listing
            .try_skip_while(|meta| futures::future::ready(Ok(meta.location.as_ref() < prefix)))
            .try_take_while(|meta| {
                futures::future::ready(Ok(meta.location.as_ref().starts_with(prefix)))
            })
            .take(limit + 1)
            .try_collect()
            .await
            .map_err(|e| StorageError::backend("list", e))?;

        let truncated = metas.len() > limit;
        metas.truncate(limit);

        let cursor = if truncated {
            metas.last().map(|meta| encode_cursor(meta.location.as_ref()))
        } else {
            None
        };

        Ok(ObjectPage {
            objects: metas.iter().map(|meta| to_stored_object(meta, None)).collect(),
            truncated,
            cursor,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket.name()))]
    async fn head(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let path = Self::path_for(key)?;

        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        match self.bucket.store().get_opts(&path, options).await {
            Ok(result) => Ok(Some(to_stored_object(&result.meta, Some(&result.attributes)))),
            Err(e) if not_found(&e) => Ok(None),
            Err(e) => Err(StorageError::backend("head", e)),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket.name()))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = Self::path_for(key)?;

        match self.bucket.store().head(&path).await {
            Ok(_) => Ok(true),
            Err(e) if not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::backend("exists", e)),
        }
    }
}
