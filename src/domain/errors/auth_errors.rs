use http::StatusCode;

use crate::domain::errors::DatabaseError;

/// Errors returned by the authentication service
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No signing secret was configured or found in the environment
    #[error("BETTER_AUTH_SECRET is not set; session tokens cannot be signed or verified")]
    MissingSecret,

    #[error("Email and password authentication is not enabled")]
    EmailPasswordDisabled,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Email is not verified")]
    EmailNotVerified,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid origin: {origin}")]
    InvalidOrigin { origin: String },

    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Password hashing failed: {message}")]
    PasswordHash { message: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl AuthError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingSecret => "MISSING_SECRET",
            AuthError::EmailPasswordDisabled => "EMAIL_PASSWORD_DISABLED",
            AuthError::InvalidCredentials => "INVALID_EMAIL_OR_PASSWORD",
            AuthError::UserAlreadyExists => "USER_ALREADY_EXISTS",
            AuthError::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::InvalidOrigin { .. } => "INVALID_ORIGIN",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::PasswordHash { .. } => "PASSWORD_HASH_FAILED",
            AuthError::Database(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailPasswordDisabled | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotVerified | AuthError::InvalidOrigin { .. } => StatusCode::FORBIDDEN,
            AuthError::UserAlreadyExists => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::MissingSecret
            | AuthError::PasswordHash { .. }
            | AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
