// Bucket bindings
pub mod r2_bucket;

// Typed client over a binding
pub mod storage_client;

pub use r2_bucket::R2Bucket;
pub use storage_client::{create_storage, public_url, StorageClient};
