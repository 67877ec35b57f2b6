use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    adapters::inbound::rpc::flatten_validation_errors,
    domain::{
        errors::AuthError,
        models::{Session, User},
    },
    services::AuthSession,
};

/// Error body of the auth endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthErrorDto {
    pub code: String,
    pub message: String,
    /// Flattened field errors when the request failed validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AuthErrorDto {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn not_configured() -> Self {
        Self::new("INTERNAL_SERVER_ERROR", "Auth not configured")
    }

    pub fn invalid_body(error: &serde_json::Error) -> Self {
        Self::new("INVALID_BODY", format!("Invalid request body: {}", error))
    }

    pub fn not_found(path: &str) -> Self {
        Self::new("NOT_FOUND", format!("No auth endpoint at /{}", path))
    }

    pub fn from_auth_error(error: &AuthError) -> Self {
        let details = match error {
            AuthError::Validation(errors) => Some(flatten_validation_errors(errors)),
            _ => None,
        };

        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

/// Response of `POST /sign-up/email`
#[derive(Debug, Clone, Serialize)]
pub struct SignUpResponseDto {
    /// Absent when the user must verify the email first or auto sign-in is off
    pub token: Option<String>,
    pub user: User,
}

/// Response of `POST /sign-in/email`
#[derive(Debug, Clone, Serialize)]
pub struct SignInResponseDto {
    pub redirect: bool,
    pub token: String,
    pub url: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponseDto {
    pub session: Session,
    pub user: User,
}

impl From<AuthSession> for SessionResponseDto {
    fn from(value: AuthSession) -> Self {
        Self {
            session: value.session,
            user: value.user,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessDto {
    pub success: bool,
}

/// Response of `GET /verify-email`
#[derive(Debug, Clone, Serialize)]
pub struct VerifyEmailResponseDto {
    pub status: bool,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

/// Query string of the procedure endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcQueryDto {
    /// Transformer envelope (or `{"0": envelope, ...}` when batching), JSON-encoded
    pub input: Option<String>,
    pub batch: Option<String>,
}

impl RpcQueryDto {
    pub fn is_batch(&self) -> bool {
        matches!(self.batch.as_deref(), Some("1") | Some("true"))
    }
}

/// Response of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponseDto {
    pub status: String,
    pub environment: Option<String>,
    pub database: String,
    pub timestamp: DateTime<Utc>,
}
