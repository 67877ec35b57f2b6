use strum::{Display, EnumString, IntoStaticStr, VariantNames};

use super::{EnvRule, EnvSchema, EnvVar, FromEnv, ValidatedEnv};
use crate::domain::{
    errors::{ConfigError, EnvViolation},
    value_objects::{AppEnvironment, BucketName, NodeEnvironment},
};

pub const AUTH_SECRET: &str = "BETTER_AUTH_SECRET";
pub const AUTH_URL: &str = "BETTER_AUTH_URL";
pub const ENVIRONMENT: &str = "ENVIRONMENT";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const NODE_ENV: &str = "NODE_ENV";
pub const CLOUDFLARE_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";
pub const CLOUDFLARE_D1_DATABASE_ID: &str = "CLOUDFLARE_D1_DATABASE_ID";
pub const CLOUDFLARE_D1_TOKEN: &str = "CLOUDFLARE_D1_TOKEN";
pub const D1_DATABASE_URL: &str = "D1_DATABASE_URL";
pub const BUCKET_BACKEND: &str = "BUCKET_BACKEND";
pub const R2_BUCKET_NAME: &str = "R2_BUCKET_NAME";
pub const R2_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
pub const R2_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";

/// Variables the HTTP server reads for auth and environment reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerEnv {
    pub auth_secret: Option<String>,
    pub auth_url: Option<String>,
    pub environment: Option<AppEnvironment>,
}

impl FromEnv for ServerEnv {
    const SCHEMA: EnvSchema = EnvSchema::new(&[
        EnvVar::optional(AUTH_SECRET, EnvRule::Text { min_len: 32 }).secret(),
        EnvVar::optional(AUTH_URL, EnvRule::Url),
        EnvVar::optional(
            ENVIRONMENT,
            EnvRule::OneOf(<AppEnvironment as VariantNames>::VARIANTS),
        ),
    ]);

    fn from_validated(env: &ValidatedEnv) -> Result<Self, ConfigError> {
        Ok(Self {
            auth_secret: env.get_owned(AUTH_SECRET),
            auth_url: env.get_owned(AUTH_URL),
            environment: env.parsed(ENVIRONMENT)?,
        })
    }
}

/// Variables used by the local database tooling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEnv {
    pub database_url: String,
    pub node_env: NodeEnvironment,
}

impl FromEnv for DatabaseEnv {
    const SCHEMA: EnvSchema = EnvSchema::new(&[
        EnvVar::required(DATABASE_URL, EnvRule::Url)
            .with_message("DATABASE_URL must be a valid URL"),
        EnvVar::required(
            NODE_ENV,
            EnvRule::OneOf(<NodeEnvironment as VariantNames>::VARIANTS),
        ),
    ]);

    fn from_validated(env: &ValidatedEnv) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: env.require(DATABASE_URL)?,
            node_env: env.parsed(NODE_ENV)?.unwrap_or_default(),
        })
    }
}

/// Credentials for applying migrations to a remote D1 database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEnv {
    pub account_id: String,
    pub database_id: String,
    pub token: String,
}

impl FromEnv for MigrationEnv {
    const SCHEMA: EnvSchema = EnvSchema::new(&[
        EnvVar::required(CLOUDFLARE_ACCOUNT_ID, EnvRule::Text { min_len: 1 })
            .with_message("CLOUDFLARE_ACCOUNT_ID is required"),
        EnvVar::required(CLOUDFLARE_D1_DATABASE_ID, EnvRule::Text { min_len: 1 })
            .with_message("CLOUDFLARE_D1_DATABASE_ID is required"),
        EnvVar::required(CLOUDFLARE_D1_TOKEN, EnvRule::Text { min_len: 1 })
            .with_message("CLOUDFLARE_D1_TOKEN is required")
            .secret(),
    ]);

    fn from_validated(env: &ValidatedEnv) -> Result<Self, ConfigError> {
        Ok(Self {
            account_id: env.require(CLOUDFLARE_ACCOUNT_ID)?,
            database_id: env.require(CLOUDFLARE_D1_DATABASE_ID)?,
            token: env.require(CLOUDFLARE_D1_TOKEN)?,
        })
    }
}

/// Bucket backend selected by `BUCKET_BACKEND`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, IntoStaticStr, VariantNames,
)]
#[strum(serialize_all = "lowercase")]
pub enum BucketKind {
    #[default]
    Memory,
    R2,
}

/// Where the server's database and bucket bindings come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingEnv {
    pub d1_database_url: Option<String>,
    pub bucket_backend: Option<BucketKind>,
    pub r2_bucket_name: Option<String>,
    pub r2_access_key_id: Option<String>,
    pub r2_secret_access_key: Option<String>,
    pub cloudflare_account_id: Option<String>,
}

impl FromEnv for BindingEnv {
    const SCHEMA: EnvSchema = EnvSchema::new(&[
        EnvVar::optional(D1_DATABASE_URL, EnvRule::Url),
        EnvVar::optional(
            BUCKET_BACKEND,
            EnvRule::OneOf(<BucketKind as VariantNames>::VARIANTS),
        ),
        EnvVar::optional(R2_BUCKET_NAME, EnvRule::Text { min_len: 1 }),
        EnvVar::optional(R2_ACCESS_KEY_ID, EnvRule::Text { min_len: 1 }),
        EnvVar::optional(R2_SECRET_ACCESS_KEY, EnvRule::Text { min_len: 1 }).secret(),
        EnvVar::optional(CLOUDFLARE_ACCOUNT_ID, EnvRule::Text { min_len: 1 }),
    ]);

    fn cross_check(env: &ValidatedEnv) -> Vec<EnvViolation> {
        let mut violations = Vec::new();

        if let Some(name) = env.get(R2_BUCKET_NAME) {
            if let Err(e) = BucketName::new(name) {
                violations.push(EnvViolation::new(R2_BUCKET_NAME, e.to_string()));
            }
        }

        if matches!(env.parsed::<BucketKind>(BUCKET_BACKEND), Ok(Some(BucketKind::R2))) {
            for key in [
                R2_BUCKET_NAME,
                R2_ACCESS_KEY_ID,
                R2_SECRET_ACCESS_KEY,
                CLOUDFLARE_ACCOUNT_ID,
            ] {
                // keys that failed their own rule are already reported
                if env.get(key).is_none() && !env.rejected(key) {
                    violations.push(EnvViolation::new(
                        key,
                        format!("is required when {}=r2", BUCKET_BACKEND),
                    ));
                }
            }
        }

        violations
    }

    fn from_validated(env: &ValidatedEnv) -> Result<Self, ConfigError> {
        Ok(Self {
            d1_database_url: env.get_owned(D1_DATABASE_URL),
            bucket_backend: env.parsed(BUCKET_BACKEND)?,
            r2_bucket_name: env.get_owned(R2_BUCKET_NAME),
            r2_access_key_id: env.get_owned(R2_ACCESS_KEY_ID),
            r2_secret_access_key: env.get_owned(R2_SECRET_ACCESS_KEY),
            cloudflare_account_id: env.get_owned(CLOUDFLARE_ACCOUNT_ID),
        })
    }
}
