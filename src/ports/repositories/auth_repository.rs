use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    errors::DbResult,
    models::{Account, Session, User, Verification},
};

/// Repository over the fixed auth schema (user, session, account, verification)
#[async_trait]
pub trait AuthRepository: Send + Sync + 'static {
    async fn create_user(&self, user: &User) -> DbResult<()>;

    async fn find_user_by_id(&self, id: &str) -> DbResult<Option<User>>;

    /// Lookup is case-insensitive; emails are stored lowercased
    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>>;

    async fn mark_email_verified(&self, user_id: &str, at: DateTime<Utc>) -> DbResult<()>;

    async fn count_users(&self) -> DbResult<u64>;

    async fn create_account(&self, account: &Account) -> DbResult<()>;

    /// The account holding the email/password credential, if any
    async fn find_credential_account(&self, user_id: &str) -> DbResult<Option<Account>>;

    async fn create_session(&self, session: &Session) -> DbResult<()>;

    async fn find_session_by_token(&self, token: &str) -> DbResult<Option<Session>>;

    /// Move a session's expiry; returns false when the session no longer exists
    async fn extend_session(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Delete a session by token; returns false when nothing was deleted
    async fn delete_session(&self, token: &str) -> DbResult<bool>;

    async fn create_verification(&self, verification: &Verification) -> DbResult<()>;

    async fn find_verification_by_value(&self, value: &str) -> DbResult<Option<Verification>>;

    async fn delete_verification(&self, id: &str) -> DbResult<()>;
}
