pub mod auth_service;
pub mod session_token;

pub use auth_service::{
    create_auth, session_token_from_headers, AuthOptions, AuthService, AuthSession,
    EmailPasswordOptions, RequestMeta, SignInEmail, SignUpEmail, SignUpOutcome, SESSION_COOKIE,
};
