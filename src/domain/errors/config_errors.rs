use std::fmt;

/// A single environment variable that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvViolation {
    pub key: String,
    pub message: String,
}

impl EnvViolation {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EnvViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Configuration errors raised while validating the process environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variables:\n{}", format_violations(.0))]
    InvalidEnvironment(Vec<EnvViolation>),
}

impl ConfigError {
    /// Every violation, in schema declaration order
    pub fn violations(&self) -> &[EnvViolation] {
        match self {
            ConfigError::InvalidEnvironment(violations) => violations,
        }
    }

    /// Names of every key that failed validation
    pub fn keys(&self) -> Vec<&str> {
        self.violations().iter().map(|v| v.key.as_str()).collect()
    }
}

fn format_violations(violations: &[EnvViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}
