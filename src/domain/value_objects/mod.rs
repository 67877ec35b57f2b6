mod bucket_name;
mod environment;
mod object_key;

pub use bucket_name::BucketName;
pub use environment::{AppEnvironment, NodeEnvironment};
pub use object_key::{ObjectKey, MAX_OBJECT_KEY_LEN};
