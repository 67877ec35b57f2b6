/// Errors raised by the database client
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The client was built without a live database binding
    #[error(
        "Database not initialized in local context. Run with a bound D1 database or provide a mock client."
    )]
    NotInitialized,

    #[error("Invalid database binding: {message}")]
    InvalidBinding { message: String },

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// The remote D1 HTTP API could not be reached
    #[error("D1 API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote D1 HTTP API answered with an error payload
    #[error("D1 API returned {status}: {message}")]
    Remote { status: u16, message: String },
}

impl DatabaseError {
    /// A UNIQUE or PRIMARY KEY constraint rejected the write
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Query(sqlx::Error::Database(err)) => err.is_unique_violation(),
            DatabaseError::Remote { message, .. } => message.contains("UNIQUE constraint failed"),
            _ => false,
        }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DatabaseError>;
