use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use super::{
    context::RequestContext,
    handlers::{auth_handler, health, rpc_mutation, rpc_query},
    middleware::{RequestId, RequestIdLayer, REQUEST_ID_HEADER},
};
use crate::{
    adapters::inbound::rpc::{app_router, ProcedureRouter},
    app::Bindings,
};

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// `None` runs the procedures against a local context without bindings
    pub bindings: Option<Bindings>,
    pub procedures: Arc<ProcedureRouter<RequestContext>>,
}

impl AppState {
    pub fn new(bindings: Bindings) -> Self {
        Self {
            bindings: Some(bindings),
            procedures: Arc::new(app_router()),
        }
    }

    /// State for running without platform bindings
    pub fn local() -> Self {
        Self {
            bindings: None,
            procedures: Arc::new(app_router()),
        }
    }

    pub fn with_procedures(mut self, procedures: ProcedureRouter<RequestContext>) -> Self {
        self.procedures = Arc::new(procedures);
        self
    }
}

/// Credentialed CORS for the configured app origin
fn cors_layer(state: &AppState) -> Option<CorsLayer> {
    let auth_url = state.bindings.as_ref()?.auth_url.as_deref()?;

    let origin = match url::Url::parse(auth_url) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(err) => {
            warn!(auth_url = %auth_url, error = %err, "Skipping CORS for unparsable auth URL");
            return None;
        }
    };
    let origin = HeaderValue::from_str(&origin).ok()?;

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    )
}

/// Create the main application router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/auth/{*rest}", any(auth_handler))
        .route("/api/trpc/{*path}", get(rpc_query).post(rpc_mutation))
        .with_state(state);

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .map(|id| id.0.as_str())
                .unwrap_or_default();
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }))
        .layer(RequestIdLayer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::create_in_memory_bindings;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_health_without_bindings() {
        let server = TestServer::new(create_router(AppState::local())).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["database"], json!("uninitialized"));
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let server = TestServer::new(create_router(AppState::local())).unwrap();

        let response = server
            .get("/health")
            .add_header(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"))
            .await;
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_health_with_bindings() {
        let bindings = create_in_memory_bindings().await.unwrap();
        let server = TestServer::new(create_router(AppState::new(bindings))).unwrap();

        let body: Value = server.get("/health").await.json();
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["database"], json!("ok"));
        assert_eq!(body["environment"], json!("development"));
    }

    #[tokio::test]
    async fn test_custom_procedures() {
        use crate::adapters::inbound::rpc::{NoInput, ProcedureResult, RichValue};

        async fn ping(_: RequestContext, _: NoInput) -> ProcedureResult {
            Ok(RichValue::string("pong"))
        }

        let state = AppState::local().with_procedures(ProcedureRouter::new().query("ping", ping));
        let server = TestServer::new(create_router(state)).unwrap();

        let body: Value = server.get("/api/trpc/ping").await.json();
        assert_eq!(body["result"]["data"]["json"], json!("pong"));

        server
            .get("/api/trpc/system.health")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_auth_without_bindings_is_not_configured() {
        let server = TestServer::new(create_router(AppState::local())).unwrap();

        let response = server.get("/api/auth/get-session").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["message"], json!("Auth not configured"));
    }
}
