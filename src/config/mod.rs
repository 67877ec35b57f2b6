//! Startup validation of the process environment.
//!
//! Every configuration struct declares an [`EnvSchema`]; validation checks each
//! declared key and reports all violations at once. A partially valid
//! environment never produces a configuration value.

mod schemas;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use crate::domain::errors::{ConfigError, EnvViolation};

pub use schemas::{
    BindingEnv, BucketKind, DatabaseEnv, MigrationEnv, ServerEnv, AUTH_SECRET, AUTH_URL,
    BUCKET_BACKEND, CLOUDFLARE_ACCOUNT_ID, CLOUDFLARE_D1_DATABASE_ID, CLOUDFLARE_D1_TOKEN,
    D1_DATABASE_URL, DATABASE_URL, ENVIRONMENT, NODE_ENV, R2_ACCESS_KEY_ID, R2_BUCKET_NAME,
    R2_SECRET_ACCESS_KEY,
};

/// Shape rule applied to a declared variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvRule {
    /// Any string with at least `min_len` characters
    Text { min_len: usize },
    /// An absolute URL
    Url,
    /// One of a fixed set of values
    OneOf(&'static [&'static str]),
}

impl EnvRule {
    fn check(&self, value: &str) -> Result<(), String> {
        match self {
            EnvRule::Text { min_len } => {
                if value.chars().count() >= *min_len {
                    Ok(())
                } else {
                    Err(format!(
                        "must contain at least {} character(s)",
                        min_len
                    ))
                }
            }
            EnvRule::Url => url::Url::parse(value)
                .map(|_| ())
                .map_err(|e| format!("must be a valid URL ({})", e)),
            EnvRule::OneOf(allowed) => {
                if allowed.contains(&value) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected one of {}, received '{}'",
                        allowed
                            .iter()
                            .map(|v| format!("'{}'", v))
                            .collect::<Vec<_>>()
                            .join(" | "),
                        value
                    ))
                }
            }
        }
    }
}

/// A declared environment variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvVar {
    pub key: &'static str,
    pub rule: EnvRule,
    pub required: bool,
    /// Replaces the generated message for every violation of this key
    pub message: Option<&'static str>,
    /// Values are masked when configuration is printed
    pub secret: bool,
}

impl EnvVar {
    pub const fn required(key: &'static str, rule: EnvRule) -> Self {
        Self {
            key,
            rule,
            required: true,
            message: None,
            secret: false,
        }
    }

    pub const fn optional(key: &'static str, rule: EnvRule) -> Self {
        Self {
            key,
            rule,
            required: false,
            message: None,
            secret: false,
        }
    }

    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// An ordered set of declared variables
#[derive(Debug, Clone, Copy)]
pub struct EnvSchema {
    vars: &'static [EnvVar],
}

impl EnvSchema {
    pub const fn new(vars: &'static [EnvVar]) -> Self {
        Self { vars }
    }

    pub fn vars(&self) -> &'static [EnvVar] {
        self.vars
    }

    /// Check every declared key, returning the accepted values and all violations
    pub fn check<I, K, V>(&self, vars: I) -> (ValidatedEnv, Vec<EnvViolation>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut input: HashMap<&'static str, String> = HashMap::new();
        for (key, value) in vars {
            if let Some(var) = self.vars.iter().find(|v| v.key == key.as_ref()) {
                input.insert(var.key, value.into());
            }
        }

        let mut values = BTreeMap::new();
        let mut rejected = BTreeSet::new();
        let mut violations = Vec::new();

        for var in self.vars {
            match input.remove(var.key) {
                Some(value) => match var.rule.check(&value) {
                    Ok(()) => {
                        values.insert(var.key, value);
                    }
                    Err(reason) => {
                        rejected.insert(var.key);
                        violations.push(EnvViolation::new(
                            var.key,
                            var.message.map(str::to_string).unwrap_or(reason),
                        ));
                    }
                },
                None if var.required => violations.push(EnvViolation::new(
                    var.key,
                    var.message.unwrap_or("is required but not set"),
                )),
                None => {}
            }
        }

        (
            ValidatedEnv {
                schema: *self,
                values,
                rejected,
            },
            violations,
        )
    }

    /// Validate the supplied variables; fails with every violated key
    pub fn validate<I, K, V>(&self, vars: I) -> Result<ValidatedEnv, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let (env, violations) = self.check(vars);
        if violations.is_empty() {
            Ok(env)
        } else {
            Err(ConfigError::InvalidEnvironment(violations))
        }
    }
}

/// Values that passed validation, restricted to the schema's declared keys
#[derive(Debug, Clone)]
pub struct ValidatedEnv {
    schema: EnvSchema,
    values: BTreeMap<&'static str, String>,
    rejected: BTreeSet<&'static str>,
}

impl ValidatedEnv {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_owned(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// Parse a present value into a typed enum or number
    pub fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                ConfigError::InvalidEnvironment(vec![EnvViolation::new(
                    key,
                    format!("cannot interpret '{}'", raw),
                )])
            }),
        }
    }

    /// Required value; only fails if the schema did not declare the key as required
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get_owned(key).ok_or_else(|| {
            ConfigError::InvalidEnvironment(vec![EnvViolation::new(key, "is required but not set")])
        })
    }

    /// Whether the key was supplied but failed its rule
    pub fn rejected(&self, key: &str) -> bool {
        self.rejected.contains(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Declared keys with their value, secrets masked, for display
    pub fn redacted(&self) -> Vec<(&'static str, Option<String>)> {
        self.schema
            .vars()
            .iter()
            .map(|var| {
                let shown = self.get(var.key).map(|value| {
                    if var.secret {
                        "********".to_string()
                    } else {
                        value.to_string()
                    }
                });
                (var.key, shown)
            })
            .collect()
    }
}

/// Configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    const SCHEMA: EnvSchema;

    /// Checks that span several variables, reported together with schema violations
    fn cross_check(_env: &ValidatedEnv) -> Vec<EnvViolation> {
        Vec::new()
    }

    fn from_validated(env: &ValidatedEnv) -> Result<Self, ConfigError>;

    fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let (env, mut violations) = Self::SCHEMA.check(vars);
        violations.extend(Self::cross_check(&env));
        if !violations.is_empty() {
            return Err(ConfigError::InvalidEnvironment(violations));
        }
        Self::from_validated(&env)
    }

    fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(process_vars())
    }
}

/// Unicode process variables; anything else is treated as unset
pub fn process_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: EnvSchema = EnvSchema::new(&[
        EnvVar::required("NAME", EnvRule::Text { min_len: 1 }).with_message("NAME is required"),
        EnvVar::required("HOMEPAGE", EnvRule::Url),
        EnvVar::optional("MODE", EnvRule::OneOf(&["fast", "slow"])),
        EnvVar::optional("TOKEN", EnvRule::Text { min_len: 4 }).secret(),
    ]);

    #[test]
    fn test_valid_environment_keeps_declared_keys_only() {
        let env = SCHEMA
            .validate([
                ("NAME", "edge"),
                ("HOMEPAGE", "https://example.com"),
                ("MODE", "fast"),
                ("UNRELATED", "ignored"),
            ])
            .unwrap();

        assert_eq!(env.get("NAME"), Some("edge"));
        assert_eq!(env.get("HOMEPAGE"), Some("https://example.com"));
        assert_eq!(env.get("MODE"), Some("fast"));
        assert_eq!(env.get("UNRELATED"), None);
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn test_every_violation_is_reported() {
        let err = SCHEMA
            .validate([("HOMEPAGE", "not a url"), ("MODE", "medium"), ("TOKEN", "abc")])
            .unwrap_err();

        assert_eq!(err.keys(), vec!["NAME", "HOMEPAGE", "MODE", "TOKEN"]);
        assert_eq!(err.violations()[0].message, "NAME is required");
        assert!(err.violations()[2].message.contains("'fast' | 'slow'"));

        let rendered = err.to_string();
        for key in ["NAME", "HOMEPAGE", "MODE", "TOKEN"] {
            assert!(rendered.contains(key), "{} missing from {}", key, rendered);
        }
    }

    #[test]
    fn test_min_length_counts_characters() {
        assert!(EnvRule::Text { min_len: 3 }.check("äöü").is_ok());
        assert!(EnvRule::Text { min_len: 3 }.check("ab").is_err());
        assert!(EnvRule::Text { min_len: 1 }.check("").is_err());
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let env = SCHEMA
            .validate([
                ("NAME", "edge"),
                ("HOMEPAGE", "https://example.com"),
                ("TOKEN", "hunter22"),
            ])
            .unwrap();

        let shown: BTreeMap<_, _> = env.redacted().into_iter().collect();
        assert_eq!(shown["TOKEN"].as_deref(), Some("********"));
        assert_eq!(shown["NAME"].as_deref(), Some("edge"));
        assert_eq!(shown["MODE"], None);
    }
}
