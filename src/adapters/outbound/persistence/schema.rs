use sqlx::SqlitePool;
use tracing::debug;

use crate::domain::errors::DbResult;

/// DDL for the auth tables, one statement per entry, safe to re-run
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "user" (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        email_verified INTEGER NOT NULL DEFAULT 0,
        image TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "session" (
        id TEXT PRIMARY KEY NOT NULL,
        expires_at TEXT NOT NULL,
        token TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        user_id TEXT NOT NULL REFERENCES "user"(id) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "account" (
        id TEXT PRIMARY KEY NOT NULL,
        account_id TEXT NOT NULL,
        provider_id TEXT NOT NULL,
        user_id TEXT NOT NULL REFERENCES "user"(id) ON DELETE CASCADE,
        access_token TEXT,
        refresh_token TEXT,
        id_token TEXT,
        access_token_expires_at TEXT,
        refresh_token_expires_at TEXT,
        scope TEXT,
        password TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS "verification" (
        id TEXT PRIMARY KEY NOT NULL,
        identifier TEXT NOT NULL,
        value TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_session_user_id ON "session"(user_id)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_account_user_id ON "account"(user_id)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_verification_identifier ON "verification"(identifier)"#,
];

/// The whole schema as a single script, as sent to the remote D1 API
pub fn schema_sql() -> String {
    SCHEMA_STATEMENTS
        .iter()
        .map(|statement| format!("{};", statement))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply every statement in one transaction
pub async fn migrate(pool: &SqlitePool) -> DbResult<()> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    debug!(statements = SCHEMA_STATEMENTS.len(), "Applied schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_script_terminates_every_statement() {
        let script = schema_sql();
        assert_eq!(script.matches(';').count(), SCHEMA_STATEMENTS.len());
        for table in ["\"user\"", "\"session\"", "\"account\"", "\"verification\""] {
            assert!(script.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)));
        }
    }
}
