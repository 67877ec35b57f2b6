use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::d1_client::DbClient;
use crate::{
    domain::{
        errors::DbResult,
        models::{Account, Session, User, Verification, CREDENTIAL_PROVIDER},
    },
    ports::repositories::AuthRepository,
};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    email_verified: bool,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            email_verified: row.email_verified,
            image: row.image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    expires_at: DateTime<Utc>,
    token: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    user_id: String,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            token: row.token,
            expires_at: row.expires_at,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    account_id: String,
    provider_id: String,
    user_id: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    access_token_expires_at: Option<DateTime<Utc>>,
    refresh_token_expires_at: Option<DateTime<Utc>>,
    scope: Option<String>,
    password: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            account_id: row.account_id,
            provider_id: row.provider_id,
            user_id: row.user_id,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            id_token: row.id_token,
            access_token_expires_at: row.access_token_expires_at,
            refresh_token_expires_at: row.refresh_token_expires_at,
            scope: row.scope,
            password: row.password,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: String,
    identifier: String,
    value: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VerificationRow> for Verification {
    fn from(row: VerificationRow) -> Self {
        Verification {
            id: row.id,
            identifier: row.identifier,
            value: row.value,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl AuthRepository for DbClient {
    async fn create_user(&self, user: &User) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "user" (id, name, email, email_verified, image, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.email.to_lowercase())
        .bind(user.email_verified)
        .bind(&user.image)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.pool()?)
        .await?;

        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(r#"SELECT * FROM "user" WHERE id = ?"#)
            .bind(id)
            .fetch_optional(self.pool()?)
            .await?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(r#"SELECT * FROM "user" WHERE email = ?"#)
            .bind(email.to_lowercase())
            .fetch_optional(self.pool()?)
            .await?;

        Ok(row.map(User::from))
    }

    async fn mark_email_verified(&self, user_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(r#"UPDATE "user" SET email_verified = 1, updated_at = ? WHERE id = ?"#)
            .bind(at)
            .bind(user_id)
            .execute(self.pool()?)
            .await?;

        Ok(())
    }

    async fn count_users(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "user""#)
            .fetch_one(self.pool()?)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn create_account(&self, account: &Account) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "account" (
                id, account_id, provider_id, user_id, access_token, refresh_token,
                id_token, access_token_expires_at, refresh_token_expires_at, scope,
                password, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.account_id)
        .bind(&account.provider_id)
        .bind(&account.user_id)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(&account.id_token)
        .bind(account.access_token_expires_at)
        .bind(account.refresh_token_expires_at)
        .bind(&account.scope)
        .bind(&account.password)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(self.pool()?)
        .await?;

        Ok(())
    }

    async fn find_credential_account(&self, user_id: &str) -> DbResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT * FROM "account" WHERE user_id = ? AND provider_id = ? LIMIT 1"#,
        )
        .bind(user_id)
        .bind(CREDENTIAL_PROVIDER)
        .fetch_optional(self.pool()?)
        .await?;

        Ok(row.map(Account::from))
    }

    async fn create_session(&self, session: &Session) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "session" (
                id, expires_at, token, created_at, updated_at, ip_address, user_agent, user_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.expires_at)
        .bind(&session.token)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.user_id)
        .execute(self.pool()?)
        .await?;

        Ok(())
    }

    async fn find_session_by_token(&self, token: &str) -> DbResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(r#"SELECT * FROM "session" WHERE token = ?"#)
            .bind(token)
            .fetch_optional(self.pool()?)
            .await?;

        Ok(row.map(Session::from))
    }

    async fn extend_session(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result =
            sqlx::query(r#"UPDATE "session" SET expires_at = ?, updated_at = ? WHERE id = ?"#)
                .bind(expires_at)
                .bind(updated_at)
                .bind(session_id)
                .execute(self.pool()?)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, token: &str) -> DbResult<bool> {
        let result = sqlx::query(r#"DELETE FROM "session" WHERE token = ?"#)
            .bind(token)
            .execute(self.pool()?)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_verification(&self, verification: &Verification) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO "verification" (id, identifier, value, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&verification.id)
        .bind(&verification.identifier)
        .bind(&verification.value)
        .bind(verification.expires_at)
        .bind(verification.created_at)
        .bind(verification.updated_at)
        .execute(self.pool()?)
        .await?;

        Ok(())
    }

    async fn find_verification_by_value(&self, value: &str) -> DbResult<Option<Verification>> {
        let row = sqlx::query_as::<_, VerificationRow>(
            r#"SELECT * FROM "verification" WHERE value = ?"#,
        )
        .bind(value)
        .fetch_optional(self.pool()?)
        .await?;

        Ok(row.map(Verification::from))
    }

    async fn delete_verification(&self, id: &str) -> DbResult<()> {
        sqlx::query(r#"DELETE FROM "verification" WHERE id = ?"#)
            .bind(id)
            .execute(self.pool()?)
            .await?;

        Ok(())
    }
}
