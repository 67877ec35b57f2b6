pub mod d1_client;
pub mod d1_http;
pub mod schema;
mod sql_auth_repository;

pub use d1_client::{create_db, D1Database, DbClient};
pub use d1_http::{D1HttpClient, D1QueryResult};
