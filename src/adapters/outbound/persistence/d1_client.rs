use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::schema;
use crate::domain::errors::{DatabaseError, DbResult};

/// Handle to a D1-style SQLite database
///
/// Cloning shares the underlying pool. Construction never touches the database;
/// connections are opened on first query.
#[derive(Clone, Debug)]
pub struct D1Database {
    pool: SqlitePool,
}

impl D1Database {
    /// Build a lazily-connecting pool from a SQLite URL (`sqlite://path`, `sqlite::memory:`)
    pub fn connect_lazy(url: &str) -> DbResult<Self> {
        if !url.starts_with("sqlite:") {
            return Err(DatabaseError::InvalidBinding {
                message: format!("unsupported database URL '{}', expected sqlite:", url),
            });
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DatabaseError::InvalidBinding {
                message: format!("cannot parse database URL '{}': {}", url, e),
            })?
            .create_if_missing(true);

        let pool = if is_memory_url(url) {
            // every connection to :memory: is a separate database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_lazy_with(options)
        } else {
            SqlitePoolOptions::new().connect_lazy_with(options)
        };

        debug!(url = %url, "Created lazy database pool");
        Ok(Self { pool })
    }

    /// Private in-memory database, mostly for tests and local runs
    pub fn in_memory() -> DbResult<Self> {
        Self::connect_lazy("sqlite::memory:")
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[derive(Clone, Debug)]
enum DbHandle {
    Bound(SqlitePool),
    Uninitialized,
}

/// Schema-bound database client handed to request contexts
#[derive(Clone, Debug)]
pub struct DbClient {
    handle: DbHandle,
}

impl DbClient {
    /// A client with no database behind it; every query fails with `NotInitialized`
    pub fn uninitialized() -> Self {
        Self {
            handle: DbHandle::Uninitialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.handle, DbHandle::Bound(_))
    }

    pub(crate) fn pool(&self) -> DbResult<&SqlitePool> {
        match &self.handle {
            DbHandle::Bound(pool) => Ok(pool),
            DbHandle::Uninitialized => Err(DatabaseError::NotInitialized),
        }
    }

    /// Create the auth tables if they do not exist yet
    pub async fn migrate(&self) -> DbResult<()> {
        let pool = self.pool()?;
        schema::migrate(pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> DbResult<()> {
        let pool = self.pool()?;
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(pool)
            .await?;
        Ok(())
    }
}

/// Wrap a database binding in a schema-bound client
pub fn create_db(database: &D1Database) -> DbClient {
    DbClient {
        handle: DbHandle::Bound(database.pool.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uninitialized_client_refuses_queries() {
        let db = DbClient::uninitialized();
        assert!(!db.is_initialized());

        let err = db.ping().await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotInitialized));
        assert!(err.to_string().starts_with("Database not initialized in local context"));

        assert!(matches!(db.migrate().await, Err(DatabaseError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_bound_client_pings_and_migrates_twice() {
        let database = D1Database::in_memory().unwrap();
        let db = create_db(&database);
        assert!(db.is_initialized());

        db.ping().await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }

    #[test]
    fn test_malformed_url_is_invalid_binding() {
        let err = D1Database::connect_lazy("postgres://localhost/app").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidBinding { .. }));
    }

    #[tokio::test]
    async fn test_clients_share_the_binding() {
        let database = D1Database::in_memory().unwrap();
        let first = create_db(&database);
        first.migrate().await.unwrap();

        let second = create_db(&database);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM \"user\"")
            .fetch_one(second.pool().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
