use tracing::info;

use crate::{
    adapters::outbound::{
        persistence::{create_db, D1Database},
        storage::R2Bucket,
    },
    config::{BindingEnv, BucketKind, FromEnv, ServerEnv},
    domain::{
        errors::{ConfigError, DatabaseError, StorageError, ValidationError},
        value_objects::{AppEnvironment, BucketName},
    },
};

/// Platform bindings shared by every request
///
/// Built once at startup; request contexts derive their clients from it.
#[derive(Debug, Clone)]
pub struct Bindings {
    pub db: D1Database,
    pub bucket: R2Bucket,
    pub environment: AppEnvironment,
    pub auth_secret: Option<String>,
    pub auth_url: Option<String>,
}

/// Configuration for the binding set
#[derive(Debug, Clone, Default)]
pub struct BindingConfig {
    pub database_backend: DatabaseBackend,
    pub bucket_backend: BucketBackend,
    pub environment: AppEnvironment,
    pub auth_secret: Option<String>,
    pub auth_url: Option<String>,
    /// Apply the auth schema while building
    pub migrate: bool,
}

/// Database backend configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabaseBackend {
    #[default]
    InMemory,
    Sqlite { url: String },
}

/// Bucket backend configuration
#[derive(Clone, Default, PartialEq, Eq)]
pub enum BucketBackend {
    #[default]
    InMemory,
    R2 {
        account_id: String,
        bucket: String,
        access_key_id: String,
        secret_access_key: String,
    },
}

impl std::fmt::Debug for BucketBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketBackend::InMemory => write!(f, "InMemory"),
            BucketBackend::R2 {
                account_id, bucket, ..
            } => f
                .debug_struct("R2")
                .field("account_id", account_id)
                .field("bucket", bucket)
                .finish_non_exhaustive(),
        }
    }
}

impl BindingConfig {
    /// Translate validated environment values into a binding configuration
    pub fn from_env_config(binding: &BindingEnv, server: &ServerEnv) -> Result<Self, AppError> {
        let database_backend = match &binding.d1_database_url {
            Some(url) => DatabaseBackend::Sqlite { url: url.clone() },
            None => DatabaseBackend::InMemory,
        };

        let bucket_backend = match binding.bucket_backend.unwrap_or_default() {
            BucketKind::Memory => BucketBackend::InMemory,
            BucketKind::R2 => {
                let required = |value: &Option<String>, key: &str| {
                    value.clone().ok_or_else(|| AppError::Configuration {
                        message: format!("{} is required for the r2 bucket backend", key),
                    })
                };
                BucketBackend::R2 {
                    account_id: required(&binding.cloudflare_account_id, "CLOUDFLARE_ACCOUNT_ID")?,
                    bucket: required(&binding.r2_bucket_name, "R2_BUCKET_NAME")?,
                    access_key_id: required(&binding.r2_access_key_id, "R2_ACCESS_KEY_ID")?,
                    secret_access_key: required(
                        &binding.r2_secret_access_key,
                        "R2_SECRET_ACCESS_KEY",
                    )?,
                }
            }
        };

        Ok(Self {
            database_backend,
            bucket_backend,
            environment: server.environment.unwrap_or_default(),
            auth_secret: server.auth_secret.clone(),
            auth_url: server.auth_url.clone(),
            migrate: false,
        })
    }
}

/// Application builder for the binding set
pub struct AppBuilder {
    config: BindingConfig,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: BindingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BindingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_database_backend(mut self, backend: DatabaseBackend) -> Self {
        self.config.database_backend = backend;
        self
    }

    pub fn with_bucket_backend(mut self, backend: BucketBackend) -> Self {
        self.config.bucket_backend = backend;
        self
    }

    pub fn with_environment(mut self, environment: AppEnvironment) -> Self {
        self.config.environment = environment;
        self
    }

    pub fn with_auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth_secret = Some(secret.into());
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth_url = Some(url.into());
        self
    }

    pub fn with_migrations(mut self, migrate: bool) -> Self {
        self.config.migrate = migrate;
        self
    }

    /// Create the database and bucket handles
    pub async fn build(self) -> Result<Bindings, AppError> {
        let db = self.create_database()?;
        let bucket = self.create_bucket()?;

        if self.config.migrate {
            create_db(&db).migrate().await?;
        }

        info!(
            environment = %self.config.environment,
            bucket = %bucket.name(),
            "Bindings ready"
        );

        Ok(Bindings {
            db,
            bucket,
            environment: self.config.environment,
            auth_secret: self.config.auth_secret,
            auth_url: self.config.auth_url,
        })
    }

    fn create_database(&self) -> Result<D1Database, AppError> {
        let db = match &self.config.database_backend {
            DatabaseBackend::InMemory => D1Database::in_memory()?,
            DatabaseBackend::Sqlite { url } => D1Database::connect_lazy(url)?,
        };
        Ok(db)
    }

    fn create_bucket(&self) -> Result<R2Bucket, AppError> {
        match &self.config.bucket_backend {
            BucketBackend::InMemory => Ok(R2Bucket::in_memory()),
            BucketBackend::R2 {
                account_id,
                bucket,
                access_key_id,
                secret_access_key,
            } => {
                let name = BucketName::new(bucket.as_str())?;
                Ok(R2Bucket::r2(
                    account_id,
                    &name,
                    access_key_id,
                    secret_access_key,
                )?)
            }
        }
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Environment(#[from] ConfigError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid value: {0}")]
    InvalidValue(#[from] ValidationError),

    #[error("Database initialization error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Bucket initialization error: {0}")]
    Storage(#[from] StorageError),
}

/// In-memory database and bucket, schema applied
pub async fn create_in_memory_bindings() -> Result<Bindings, AppError> {
    AppBuilder::new().with_migrations(true).build().await
}

/// Bindings described by the process environment
pub async fn create_bindings_from_env() -> Result<Bindings, AppError> {
    let binding = BindingEnv::from_env()?;
    let server = ServerEnv::from_env()?;
    let config = BindingConfig::from_env_config(&binding, &server)?;
    AppBuilder::new().with_config(config).build().await
}
