use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use super::session_token;
use crate::{
    adapters::outbound::persistence::DbClient,
    config::AUTH_SECRET,
    domain::{
        errors::{AuthError, AuthResult},
        models::{Account, Session, SessionPolicy, User, Verification, CREDENTIAL_PROVIDER},
    },
    ports::repositories::AuthRepository,
};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "auth.session_token";

/// Email/password provider settings
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct EmailPasswordOptions {
    #[builder(default = true)]
    pub enabled: bool,
    #[builder(default)]
    pub require_email_verification: bool,
    #[builder(default = 8)]
    pub min_password_length: usize,
    #[builder(default = 128)]
    pub max_password_length: usize,
    /// Issue a session straight after sign-up
    #[builder(default = true)]
    pub auto_sign_in: bool,
}

impl Default for EmailPasswordOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything `create_auth` needs
#[derive(Debug, Clone, bon::Builder)]
pub struct AuthOptions {
    pub db: DbClient,
    /// Public origin of the app; enables origin checks and secure cookies on https
    #[builder(into)]
    pub base_url: Option<String>,
    /// Falls back to `BETTER_AUTH_SECRET` when absent
    #[builder(into)]
    pub secret: Option<String>,
    #[builder(default)]
    pub session: SessionPolicy,
    #[builder(default)]
    pub email_and_password: EmailPasswordOptions,
    #[builder(default = Duration::hours(1))]
    pub verification_expires_in: Duration,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpEmail {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
    #[validate(url(message = "Image must be a URL"))]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInEmail {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Client details recorded on new sessions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let ip_address = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .or_else(|| header_str("x-real-ip"))
            .or_else(|| header_str("cf-connecting-ip"))
            .map(str::to_string);

        Self {
            ip_address,
            user_agent: header_str(header::USER_AGENT.as_str()).map(str::to_string),
        }
    }
}

/// A live session together with its user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSession {
    pub session: Session,
    pub user: User,
    /// Expiry was moved during this lookup; the cookie should be re-issued
    #[serde(skip)]
    pub renewed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: User,
    /// Present when the user is signed in right away
    pub session: Option<Session>,
    /// Present when the email address must be confirmed first
    pub verification_token: Option<String>,
}

/// Email/password authentication over the fixed auth schema
#[derive(Clone)]
pub struct AuthService {
    repository: Arc<dyn AuthRepository>,
    secret: Option<String>,
    base_url: Option<String>,
    policy: SessionPolicy,
    email_and_password: EmailPasswordOptions,
    verification_expires_in: Duration,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("base_url", &self.base_url)
            .field("has_secret", &self.secret.is_some())
            .field("policy", &self.policy)
            .field("email_and_password", &self.email_and_password)
            .finish_non_exhaustive()
    }
}

/// Build the auth service; no I/O happens here
pub fn create_auth(options: AuthOptions) -> AuthService {
    let secret = options
        .secret
        .or_else(|| std::env::var(AUTH_SECRET).ok())
        .filter(|s| !s.is_empty());

    if secret.is_none() {
        warn!("No auth secret configured; session signing will fail");
    }

    AuthService {
        repository: Arc::new(options.db),
        secret,
        base_url: options.base_url,
        policy: options.session,
        email_and_password: options.email_and_password,
        verification_expires_in: options.verification_expires_in,
    }
}

impl AuthService {
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn email_and_password(&self) -> &EmailPasswordOptions {
        &self.email_and_password
    }

    fn secret(&self) -> AuthResult<&str> {
        self.secret.as_deref().ok_or(AuthError::MissingSecret)
    }

    fn ensure_enabled(&self) -> AuthResult<()> {
        if self.email_and_password.enabled {
            Ok(())
        } else {
            Err(AuthError::EmailPasswordDisabled)
        }
    }

    fn check_password_length(&self, password: &str, errors: &mut ValidationErrors) {
        let len = password.chars().count();
        let min = self.email_and_password.min_password_length;
        let max = self.email_and_password.max_password_length;

        let message = if len < min {
            format!("Password must be at least {} characters", min)
        } else if len > max {
            format!("Password must be at most {} characters", max)
        } else {
            return;
        };

        let mut error = ValidationError::new("length").with_message(Cow::Owned(message));
        error.add_param(Cow::Borrowed("min"), &min);
        error.add_param(Cow::Borrowed("max"), &max);
        errors.add("password", error);
    }

    fn hash_password(&self, password: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::PasswordHash {
                message: e.to_string(),
            })
    }

    fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| AuthError::PasswordHash {
            message: e.to_string(),
        })?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    async fn open_session(&self, user_id: &str, meta: &RequestMeta) -> AuthResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token: session_token::generate_token(),
            expires_at: self.policy.expiry_from(now),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            created_at: now,
            updated_at: now,
        };
        self.repository.create_session(&session).await?;

        debug!(user_id = %user_id, session_id = %session.id, "Opened session");
        Ok(session)
    }

    /// Register a user with an email/password credential
    pub async fn sign_up_email(
        &self,
        input: SignUpEmail,
        meta: &RequestMeta,
    ) -> AuthResult<SignUpOutcome> {
        self.ensure_enabled()?;

        let mut errors = match input.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        self.check_password_length(&input.password, &mut errors);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        let email = input.email.trim().to_lowercase();
        if self.repository.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists);
        }

        let password_hash = self.hash_password(&input.password)?;
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            email: email.clone(),
            email_verified: false,
            image: input.image,
            created_at: now,
            updated_at: now,
        };
        self.repository.create_user(&user).await.map_err(|err| {
            if err.is_unique_violation() {
                AuthError::UserAlreadyExists
            } else {
                err.into()
            }
        })?;

        self.repository
            .create_account(&Account {
                id: Uuid::new_v4().to_string(),
                account_id: user.id.clone(),
                provider_id: CREDENTIAL_PROVIDER.to_string(),
                user_id: user.id.clone(),
                access_token: None,
                refresh_token: None,
                id_token: None,
                access_token_expires_at: None,
                refresh_token_expires_at: None,
                scope: None,
                password: Some(password_hash),
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(user_id = %user.id, "User signed up");

        if self.email_and_password.require_email_verification {
            let token = session_token::generate_token();
            self.repository
                .create_verification(&Verification {
                    id: Uuid::new_v4().to_string(),
                    identifier: email,
                    value: token.clone(),
                    expires_at: now + self.verification_expires_in,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            return Ok(SignUpOutcome {
                user,
                session: None,
                verification_token: Some(token),
            });
        }

        let session = if self.email_and_password.auto_sign_in {
            Some(self.open_session(&user.id, meta).await?)
        } else {
            None
        };

        Ok(SignUpOutcome {
            user,
            session,
            verification_token: None,
        })
    }

    /// Check credentials and open a new session
    pub async fn sign_in_email(
        &self,
        input: SignInEmail,
        meta: &RequestMeta,
    ) -> AuthResult<AuthSession> {
        self.ensure_enabled()?;
        input.validate()?;

        let email = input.email.trim().to_lowercase();
        let Some(user) = self.repository.find_user_by_email(&email).await? else {
            warn!("Sign-in attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let hash = self
            .repository
            .find_credential_account(&user.id)
            .await?
            .and_then(|account| account.password)
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(&input.password, &hash)? {
            warn!(user_id = %user.id, "Sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if self.email_and_password.require_email_verification && !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let session = self.open_session(&user.id, meta).await?;
        info!(user_id = %user.id, "User signed in");

        Ok(AuthSession {
            session,
            user,
            renewed: false,
        })
    }

    /// Resolve a signed session token, renewing or expiring it as needed
    pub async fn get_session(&self, signed_token: &str) -> AuthResult<Option<AuthSession>> {
        let Some(token) = session_token::verify(self.secret()?, signed_token)? else {
            return Ok(None);
        };

        let Some(mut session) = self.repository.find_session_by_token(&token).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.is_expired(now) {
            self.repository.delete_session(&token).await?;
            debug!(session_id = %session.id, "Removed expired session");
            return Ok(None);
        }

        let Some(user) = self.repository.find_user_by_id(&session.user_id).await? else {
            self.repository.delete_session(&token).await?;
            return Ok(None);
        };

        let mut renewed = false;
        if self.policy.needs_renewal(&session, now) {
            let expires_at = self.policy.expiry_from(now);
            if self
                .repository
                .extend_session(&session.id, expires_at, now)
                .await?
            {
                session.expires_at = expires_at;
                session.updated_at = now;
                renewed = true;
                debug!(session_id = %session.id, "Renewed session");
            }
        }

        Ok(Some(AuthSession {
            session,
            user,
            renewed,
        }))
    }

    /// Session carried by the request's cookie, if any
    pub async fn session_from_headers(&self, headers: &HeaderMap) -> AuthResult<Option<AuthSession>> {
        match session_token_from_headers(headers) {
            Some(signed) => self.get_session(&signed).await,
            None => Ok(None),
        }
    }

    /// End the session behind a signed token; returns false when it was already gone
    pub async fn sign_out(&self, signed_token: &str) -> AuthResult<bool> {
        let Some(token) = session_token::verify(self.secret()?, signed_token)? else {
            return Ok(false);
        };
        Ok(self.repository.delete_session(&token).await?)
    }

    /// Consume a verification token and mark the user's email as verified
    pub async fn verify_email(&self, token: &str) -> AuthResult<User> {
        let verification = self
            .repository
            .find_verification_by_value(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let now = Utc::now();
        if verification.expires_at <= now {
            self.repository.delete_verification(&verification.id).await?;
            return Err(AuthError::InvalidToken);
        }

        let mut user = self
            .repository
            .find_user_by_email(&verification.identifier)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.repository.mark_email_verified(&user.id, now).await?;
        self.repository.delete_verification(&verification.id).await?;

        user.email_verified = true;
        user.updated_at = now;
        info!(user_id = %user.id, "Email verified");
        Ok(user)
    }

    fn secure_cookies(&self) -> bool {
        self.base_url
            .as_deref()
            .is_some_and(|url| url.starts_with("https://"))
    }

    /// `Set-Cookie` value carrying the signed session token
    pub fn session_cookie(&self, session: &Session) -> AuthResult<String> {
        let signed = session_token::sign(self.secret()?, &session.token)?;
        let mut cookie = format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            signed,
            self.policy.expires_in.num_seconds()
        );
        if self.secure_cookies() {
            cookie.push_str("; Secure");
        }
        Ok(cookie)
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn clear_session_cookie(&self) -> String {
        let mut cookie = format!("{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE);
        if self.secure_cookies() {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Reject cross-origin browser requests when a base URL is configured
    pub fn check_origin(&self, headers: &HeaderMap) -> AuthResult<()> {
        let Some(base_url) = self.base_url.as_deref() else {
            return Ok(());
        };

        let Some(origin) = headers
            .get(header::ORIGIN)
            .or_else(|| headers.get(header::REFERER))
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(());
        };

        let same_origin = match (url::Url::parse(base_url), url::Url::parse(origin)) {
            (Ok(expected), Ok(actual)) => expected.origin() == actual.origin(),
            _ => false,
        };

        if same_origin {
            Ok(())
        } else {
            warn!(origin = %origin, "Rejected request from foreign origin");
            Err(AuthError::InvalidOrigin {
                origin: origin.to_string(),
            })
        }
    }
}

/// The signed session token from the `Cookie` headers
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
