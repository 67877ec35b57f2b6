//! Client for the Cloudflare D1 HTTP query API, used to migrate remote databases.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::schema;
use crate::{
    config::MigrationEnv,
    domain::errors::{DatabaseError, DbResult},
};

pub const D1_API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct D1ApiMessage {
    pub code: i64,
    pub message: String,
}

/// Result of one statement in a query call
#[derive(Debug, Clone, Deserialize)]
pub struct D1QueryResult {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub meta: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct D1Response {
    success: bool,
    #[serde(default)]
    errors: Vec<D1ApiMessage>,
    #[serde(default)]
    result: Option<Vec<D1QueryResult>>,
}

#[derive(Clone)]
pub struct D1HttpClient {
    http: Client,
    base_url: String,
    account_id: String,
    database_id: String,
    token: String,
}

impl std::fmt::Debug for D1HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("D1HttpClient")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .field("database_id", &self.database_id)
            .finish_non_exhaustive()
    }
}

impl D1HttpClient {
    pub fn new(env: &MigrationEnv) -> Self {
        Self {
            http: Client::new(),
            base_url: D1_API_BASE.to_string(),
            account_id: env.account_id.clone(),
            database_id: env.database_id.clone(),
            token: env.token.clone(),
        }
    }

    /// Point the client at another API root, e.g. a local mock
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn query_url(&self) -> String {
        format!(
            "{}/accounts/{}/d1/database/{}/query",
            self.base_url, self.account_id, self.database_id
        )
    }

    pub async fn query(&self, sql: &str) -> DbResult<Vec<D1QueryResult>> {
        debug!(url = %self.query_url(), "Sending D1 query");

        let response = self
            .http
            .post(self.query_url())
            .bearer_auth(&self.token)
            .json(&QueryRequest { sql })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_response(status, &body)
    }

    /// Apply the auth schema to the remote database
    pub async fn migrate(&self) -> DbResult<usize> {
        let results = self.query(&schema::schema_sql()).await?;
        info!(
            database_id = %self.database_id,
            statements = results.len(),
            "Applied schema to remote D1 database"
        );
        Ok(results.len())
    }
}

fn parse_response(status: StatusCode, body: &str) -> DbResult<Vec<D1QueryResult>> {
    let parsed: D1Response = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => {
            return Err(DatabaseError::Remote {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            })
        }
    };

    if !status.is_success() || !parsed.success {
        let message = if parsed.errors.is_empty() {
            "unknown error".to_string()
        } else {
            parsed
                .errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(DatabaseError::Remote {
            status: status.as_u16(),
            message,
        });
    }

    Ok(parsed.result.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> D1HttpClient {
        D1HttpClient::new(&MigrationEnv {
            account_id: "acc123".into(),
            database_id: "db456".into(),
            token: "secret".into(),
        })
    }

    #[test]
    fn test_query_url() {
        assert_eq!(
            client().query_url(),
            "https://api.cloudflare.com/client/v4/accounts/acc123/d1/database/db456/query"
        );
        assert_eq!(
            client().with_base_url("http://localhost:8787/").query_url(),
            "http://localhost:8787/accounts/acc123/d1/database/db456/query"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        assert!(!format!("{:?}", client()).contains("secret"));
    }

    #[test]
    fn test_parse_success() {
        let body = r#"{"success":true,"errors":[],"messages":[],"result":[{"results":[],"success":true,"meta":{"changes":0}}]}"#;
        let results = parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"success":false,"errors":[{"code":7500,"message":"near \"CREATE\": syntax error"}],"result":null}"#;
        let err = parse_response(StatusCode::BAD_REQUEST, body).unwrap_err();
        match err {
            DatabaseError::Remote { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("7500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_non_json_body() {
        let err = parse_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, DatabaseError::Remote { status: 502, .. }));
    }
}
