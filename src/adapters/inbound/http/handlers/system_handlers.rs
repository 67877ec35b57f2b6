use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::{
    adapters::{
        inbound::http::{dto::HealthResponseDto, router::AppState},
        outbound::persistence::create_db,
    },
    domain::errors::DatabaseError,
};

/// Liveness plus a database round trip
pub async fn health(State(app_state): State<AppState>) -> (StatusCode, Json<HealthResponseDto>) {
    let (environment, ping) = match &app_state.bindings {
        Some(bindings) => (
            Some(bindings.environment.to_string()),
            create_db(&bindings.db).ping().await,
        ),
        None => (None, Err(DatabaseError::NotInitialized)),
    };

    let (status, database) = match ping {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(DatabaseError::NotInitialized) => (StatusCode::OK, "uninitialized"),
        Err(err) => {
            tracing::warn!(error = %err, "Health check could not reach the database");
            (StatusCode::SERVICE_UNAVAILABLE, "error")
        }
    };

    let body = HealthResponseDto {
        status: if status.is_success() { "ok" } else { "degraded" }.to_string(),
        environment,
        database: database.to_string(),
        timestamp: Utc::now(),
    };
    (status, Json(body))
}
