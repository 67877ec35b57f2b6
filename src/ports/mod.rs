pub mod repositories;
pub mod storage;

// Re-export all port traits for convenience
pub use repositories::AuthRepository;
pub use storage::ObjectStorage;
