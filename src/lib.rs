pub mod adapters;
pub mod app;
pub mod config;
pub mod domain;
pub mod ports;
pub mod services;

// Re-export key types for convenience

// Domain types - entities, value objects and errors
pub use domain::{
    Account,
    AppEnvironment,
    AuthError,
    BucketName,
    ConfigError,
    DatabaseError,
    EnvViolation,
    HttpMetadata,
    ListOptions,
    NodeEnvironment,
    ObjectKey,
    ObjectPage,
    Session,
    SessionPolicy,
    StorageError,
    StoredObject,
    StoredObjectBody,
    UploadOptions,
    User,
    ValidationError,
    Verification,
};

// Port types - interfaces for external systems
pub use ports::{AuthRepository, ObjectStorage};

// Configuration - environment validation
pub use config::{
    BindingEnv, BucketKind, DatabaseEnv, EnvRule, EnvSchema, EnvVar, FromEnv, MigrationEnv,
    ServerEnv, ValidatedEnv,
};

// Service implementations
pub use services::{create_auth, AuthOptions, AuthService, EmailPasswordOptions};

// Binding set and application assembly
pub use app::{
    create_bindings_from_env, create_in_memory_bindings, AppBuilder, AppError, BindingConfig,
    Bindings, BucketBackend, DatabaseBackend,
};

// Adapter types - infrastructure implementations
pub use adapters::outbound::persistence::{create_db, D1Database, D1HttpClient, DbClient};
pub use adapters::outbound::storage::{create_storage, public_url, R2Bucket, StorageClient};
pub use adapters::inbound::http::context::{
    create_context, create_context_local, create_inner_context, CreateContextOptions,
    RequestContext,
};
pub use adapters::inbound::http::router::{create_router, AppState};
pub use adapters::inbound::rpc::{
    app_router, format_error, ProcedureError, ProcedureKind, ProcedureRouter, RichValue,
    RpcErrorCode,
};

// Public facade for easy construction
pub mod prelude {
    pub use crate::{
        create_auth, create_context, create_context_local, create_db, create_router,
        create_storage, public_url, AppBuilder, AppState, AuthOptions, AuthService, Bindings,
        DbClient, ObjectStorage, ProcedureError, ProcedureRouter, R2Bucket, RequestContext,
        RichValue, StorageClient,
    };
}
