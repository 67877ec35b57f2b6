use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    error::ProcedureError,
    procedure::{NoInput, ProcedureResult, ProcedureRouter},
    transformer::RichValue,
};
use crate::{
    adapters::{inbound::http::context::RequestContext, outbound::storage::StorageClient},
    domain::{
        errors::DatabaseError,
        models::{ListOptions, Session, StoredObject, User},
    },
    ports::{repositories::AuthRepository, storage::ObjectStorage},
    services::{AuthService, AuthSession},
};

#[derive(Debug, Deserialize, Validate)]
pub struct ByEmailInput {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListInput {
    pub prefix: Option<String>,
    #[validate(range(min = 1, max = 1000, message = "Limit must be between 1 and 1000"))]
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct KeyInput {
    #[validate(length(min = 1, max = 1024, message = "Key must be 1 to 1024 characters"))]
    pub key: String,
}

/// Serialize a value and restore the timestamp fields serde flattened to strings
fn with_dates<T: Serialize>(
    value: &T,
    dates: &[(&str, chrono::DateTime<Utc>)],
) -> ProcedureResult {
    let mut value = RichValue::from_serialize(value)
        .map_err(|e| ProcedureError::internal(format!("Failed to encode output: {}", e)))?;
    if let RichValue::Object(map) = &mut value {
        for (field, date) in dates {
            map.insert(field.to_string(), RichValue::Date(*date));
        }
    }
    Ok(value)
}

fn user_value(user: &User) -> ProcedureResult {
    with_dates(
        user,
        &[("createdAt", user.created_at), ("updatedAt", user.updated_at)],
    )
}

fn session_value(session: &Session) -> ProcedureResult {
    // the raw token never leaves the server through this surface
    let mut value = with_dates(
        session,
        &[
            ("expiresAt", session.expires_at),
            ("createdAt", session.created_at),
            ("updatedAt", session.updated_at),
        ],
    )?;
    if let RichValue::Object(map) = &mut value {
        map.remove("token");
    }
    Ok(value)
}

fn object_value(object: &StoredObject) -> ProcedureResult {
    with_dates(object, &[("uploaded", object.uploaded)])
}

fn auth_session_value(session: &AuthSession) -> ProcedureResult {
    Ok(RichValue::object([
        ("session", session_value(&session.session)?),
        ("user", user_value(&session.user)?),
    ]))
}

fn require_storage(ctx: &RequestContext) -> Result<&StorageClient, ProcedureError> {
    ctx.storage
        .as_ref()
        .ok_or_else(|| ProcedureError::internal("Storage binding not configured"))
}

fn require_auth(ctx: &RequestContext) -> Result<&AuthService, ProcedureError> {
    ctx.auth
        .as_ref()
        .ok_or_else(|| ProcedureError::internal("Auth not configured"))
}

async fn require_session(ctx: &RequestContext) -> Result<AuthSession, ProcedureError> {
    require_auth(ctx)?
        .session_from_headers(&ctx.headers)
        .await?
        .ok_or_else(|| ProcedureError::unauthorized("Authentication required"))
}

async fn health(ctx: RequestContext, _: NoInput) -> ProcedureResult {
    let database = match ctx.db.ping().await {
        Ok(()) => "ok",
        Err(DatabaseError::NotInitialized) => "uninitialized",
        Err(err) => {
            tracing::warn!(error = %err, "Database health check failed");
            "error"
        }
    };

    Ok(RichValue::object([
        ("status", RichValue::string("ok")),
        ("time", RichValue::Date(Utc::now())),
        ("database", RichValue::string(database)),
        ("storage", RichValue::Bool(ctx.storage.is_some())),
    ]))
}

async fn user_by_email(ctx: RequestContext, input: ByEmailInput) -> ProcedureResult {
    require_session(&ctx).await?;
    let email = input.email.trim().to_lowercase();
    match ctx.db.find_user_by_email(&email).await? {
        Some(user) => user_value(&user),
        None => Ok(RichValue::Null),
    }
}

async fn current_session(ctx: RequestContext, _: NoInput) -> ProcedureResult {
    let Some(auth) = ctx.auth.as_ref() else {
        return Ok(RichValue::Null);
    };
    match auth.session_from_headers(&ctx.headers).await? {
        Some(session) => auth_session_value(&session),
        None => Ok(RichValue::Null),
    }
}

async fn storage_list(ctx: RequestContext, input: ListInput) -> ProcedureResult {
    require_session(&ctx).await?;
    let storage = require_storage(&ctx)?;
    let page = storage
        .list(ListOptions {
            prefix: input.prefix,
            limit: input.limit,
            cursor: input.cursor,
        })
        .await?;

    let objects = page
        .objects
        .iter()
        .map(object_value)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RichValue::object([
        ("objects", RichValue::Array(objects)),
        ("truncated", RichValue::Bool(page.truncated)),
        ("cursor", page.cursor.into()),
    ]))
}

async fn storage_head(ctx: RequestContext, input: KeyInput) -> ProcedureResult {
    require_session(&ctx).await?;
    match require_storage(&ctx)?.head(&input.key).await? {
        Some(object) => object_value(&object),
        None => Ok(RichValue::Null),
    }
}

async fn storage_remove(ctx: RequestContext, input: KeyInput) -> ProcedureResult {
    let session = require_session(&ctx).await?;
    require_storage(&ctx)?.remove(&input.key).await?;
    tracing::info!(key = %input.key, user_id = %session.user.id, "Object removed");
    Ok(RichValue::object([("removed", RichValue::string(input.key))]))
}

/// All application procedures
pub fn app_router() -> ProcedureRouter<RequestContext> {
    let system = ProcedureRouter::new().query("health", health);
    let user = ProcedureRouter::new().query("byEmail", user_by_email);
    let auth = ProcedureRouter::new().query("session", current_session);
    let storage = ProcedureRouter::new()
        .query("list", storage_list)
        .query("head", storage_head)
        .mutation("remove", storage_remove);

    ProcedureRouter::new()
        .merge("system", system)
        .merge("user", user)
        .merge("auth", auth)
        .merge("storage", storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::inbound::http::context::{create_context, create_context_local},
        adapters::inbound::rpc::{error::RpcErrorCode, procedure::ProcedureKind},
        app::{create_in_memory_bindings, AppBuilder, Bindings},
        services::{RequestMeta, SignUpEmail},
    };
    use bytes::Bytes;
    use http::{header, HeaderMap, HeaderValue};
    use serde_json::json;

    const SECRET: &str = "app-router-secret-0123456789abcdef";

    async fn bindings_with_auth() -> Bindings {
        AppBuilder::new()
            .with_migrations(true)
            .with_auth_secret(SECRET)
            .build()
            .await
            .unwrap()
    }

    /// Context whose cookie carries a fresh session for ada@example.com
    async fn signed_in_context(bindings: &Bindings) -> RequestContext {
        let auth = create_context(HeaderMap::new(), bindings).auth.unwrap();
        let outcome = auth
            .sign_up_email(
                SignUpEmail {
                    name: "Ada".into(),
                    email: "ada@example.com".into(),
                    password: "correct horse battery".into(),
                    image: None,
                },
                &RequestMeta::default(),
            )
            .await
            .unwrap();
        let cookie = auth.session_cookie(&outcome.session.unwrap()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(cookie.split(';').next().unwrap()).unwrap(),
        );
        create_context(headers, bindings)
    }

    #[tokio::test]
    async fn test_health_reports_uninitialized_database() {
        let ctx = create_context_local(HeaderMap::new());
        let out = app_router()
            .call("system.health", ProcedureKind::Query, ctx, RichValue::Undefined)
            .await
            .unwrap();

        assert_eq!(out.get("database"), Some(&RichValue::string("uninitialized")));
        assert!(matches!(out.get("time"), Some(RichValue::Date(_))));
    }

    #[tokio::test]
    async fn test_user_lookup_fails_without_auth() {
        let ctx = create_context_local(HeaderMap::new());
        let err = app_router()
            .call(
                "user.byEmail",
                ProcedureKind::Query,
                ctx,
                RichValue::from_json(json!({"email": "ada@example.com"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::InternalServerError);
        assert_eq!(err.message, "Auth not configured");
    }

    #[tokio::test]
    async fn test_user_lookup_for_signed_in_caller() {
        let bindings = bindings_with_auth().await;
        let ctx = signed_in_context(&bindings).await;

        let out = app_router()
            .call(
                "user.byEmail",
                ProcedureKind::Query,
                ctx,
                RichValue::from_json(json!({"email": "ADA@example.com"})),
            )
            .await
            .unwrap();
        assert_eq!(out.get("email"), Some(&RichValue::string("ada@example.com")));
        assert!(matches!(out.get("createdAt"), Some(RichValue::Date(_))));
    }

    #[tokio::test]
    async fn test_protected_procedures_require_session() {
        let bindings = create_in_memory_bindings().await.unwrap();
        let calls = [
            ("user.byEmail", ProcedureKind::Query, json!({"email": "ada@example.com"})),
            ("storage.list", ProcedureKind::Query, json!({})),
            ("storage.head", ProcedureKind::Query, json!({"key": "a.txt"})),
            ("storage.remove", ProcedureKind::Mutation, json!({"key": "a.txt"})),
        ];

        for (path, kind, input) in calls {
            let ctx = create_context(HeaderMap::new(), &bindings);
            let err = app_router()
                .call(path, kind, ctx, RichValue::from_json(input))
                .await
                .unwrap_err();
            assert_eq!(err.code, RpcErrorCode::Unauthorized, "{}", path);
        }
    }

    #[tokio::test]
    async fn test_storage_list_round_trip() {
        let bindings = bindings_with_auth().await;
        let ctx = signed_in_context(&bindings).await;
        ctx.storage
            .as_ref()
            .unwrap()
            .upload("docs/a.txt", Bytes::from_static(b"a"), Default::default())
            .await
            .unwrap();

        let out = app_router()
            .call(
                "storage.list",
                ProcedureKind::Query,
                ctx,
                RichValue::from_json(json!({"prefix": "docs/"})),
            )
            .await
            .unwrap();

        let RichValue::Array(objects) = out.get("objects").unwrap() else {
            panic!("objects should be an array");
        };
        assert_eq!(objects.len(), 1);
        assert!(matches!(objects[0].get("uploaded"), Some(RichValue::Date(_))));
    }

    #[tokio::test]
    async fn test_storage_list_rejects_bad_limit() {
        let bindings = create_in_memory_bindings().await.unwrap();
        let ctx = create_context(HeaderMap::new(), &bindings);
        let err = app_router()
            .call(
                "storage.list",
                ProcedureKind::Query,
                ctx,
                RichValue::from_json(json!({"limit": 5000})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::BadRequest);
        assert!(err.validation_errors().is_some());
    }
}
