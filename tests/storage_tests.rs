use bytes::Bytes;
use edge_app_server::{
    create_storage, public_url, HttpMetadata, ListOptions, ObjectStorage, R2Bucket,
    StorageClient, StorageError, UploadOptions,
};
use std::collections::HashMap;

fn storage() -> StorageClient {
    create_storage(&R2Bucket::in_memory())
}

#[tokio::test]
async fn download_of_unknown_key_is_none() {
    let storage = storage();
    assert!(storage.download("missing.txt").await.unwrap().is_none());
    assert!(storage.head("missing.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn upload_then_download_preserves_bytes_and_metadata() {
    let storage = storage();
    let data = Bytes::from_static(b"\x00\x01binary\xffpayload");

    let options = UploadOptions::builder()
        .content_type("application/octet-stream")
        .http_metadata(HttpMetadata {
            cache_control: Some("max-age=3600".into()),
            ..Default::default()
        })
        .custom_metadata(HashMap::from([("owner".to_string(), "ada".to_string())]))
        .build();

    let stored = storage
        .upload("uploads/blob.bin", data.clone(), options)
        .await
        .unwrap();
    assert_eq!(stored.size, data.len() as u64);

    let object = storage.download("uploads/blob.bin").await.unwrap().unwrap();
    assert_eq!(
        object.object.http_metadata.content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(
        object.object.http_metadata.cache_control.as_deref(),
        Some("max-age=3600")
    );
    assert_eq!(object.object.custom_metadata.get("owner").map(String::as_str), Some("ada"));
    assert_eq!(object.bytes().await.unwrap(), data);
}

#[tokio::test]
async fn json_and_text_bodies() {
    let storage = storage();
    storage
        .upload(
            "config.json",
            Bytes::from_static(br#"{"enabled":true}"#),
            UploadOptions::builder().content_type("application/json").build(),
        )
        .await
        .unwrap();

    let value: serde_json::Value = storage
        .download("config.json")
        .await
        .unwrap()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(value["enabled"], serde_json::json!(true));

    let text = storage.download("config.json").await.unwrap().unwrap().text().await.unwrap();
    assert_eq!(text, r#"{"enabled":true}"#);
}

#[tokio::test]
async fn remove_of_missing_key_succeeds() {
    storage().remove("never-written.txt").await.unwrap();
}

#[tokio::test]
async fn exists_tracks_upload_and_remove() {
    let storage = storage();
    assert!(!storage.exists("a.txt").await.unwrap());

    storage
        .upload("a.txt", Bytes::from_static(b"a"), UploadOptions::default())
        .await
        .unwrap();
    assert!(storage.exists("a.txt").await.unwrap());

    storage.remove("a.txt").await.unwrap();
    assert!(!storage.exists("a.txt").await.unwrap());
}

#[tokio::test]
async fn list_pages_through_prefix_in_key_order() {
    let storage = storage();
    for key in ["docs/c.txt", "docs/a.txt", "docs/b.txt", "images/x.png", "docs-old/z.txt"] {
        storage
            .upload(key, Bytes::from(key.to_string()), UploadOptions::default())
            .await
            .unwrap();
    }

    let first = storage
        .list(ListOptions {
            prefix: Some("docs/".into()),
            limit: Some(2),
            cursor: None,
        })
        .await
        .unwrap();
    let keys = first.objects.iter().map(|o| o.key.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, vec!["docs/a.txt", "docs/b.txt"]);
    assert!(first.truncated);

    let second = storage
        .list(ListOptions {
            prefix: Some("docs/".into()),
            limit: Some(2),
            cursor: first.cursor,
        })
        .await
        .unwrap();
    let keys = second.objects.iter().map(|o| o.key.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, vec!["docs/c.txt"]);
    assert!(!second.truncated);
    assert!(second.cursor.is_none());
}

#[tokio::test]
async fn list_rejects_bad_limits_and_cursors() {
    let storage = storage();

    let err = storage
        .list(ListOptions {
            limit: Some(0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidListLimit { .. }));

    let err = storage
        .list(ListOptions {
            cursor: Some("%%%".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidCursor));
}

#[tokio::test]
async fn invalid_keys_are_rejected_before_the_backend() {
    let storage = storage();
    let err = storage
        .upload("/leading-slash", Bytes::new(), UploadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey { .. }));
}

#[test]
fn public_url_follows_template() {
    assert_eq!(
        public_url("acc123", "uploads", "avatars/ada.png"),
        "https://uploads.acc123.r2.cloudflarestorage.com/avatars/ada.png"
    );
}
