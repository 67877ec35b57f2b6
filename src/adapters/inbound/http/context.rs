//! Per-request dependency context handed to every procedure.

use http::HeaderMap;

use crate::{
    adapters::outbound::{
        persistence::{create_db, DbClient},
        storage::{create_storage, StorageClient},
    },
    app::Bindings,
    services::{create_auth, AuthOptions, AuthService},
};

/// Clients available to a single request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub headers: HeaderMap,
    pub db: DbClient,
    pub auth: Option<AuthService>,
    pub storage: Option<StorageClient>,
}

/// Inputs for [`create_inner_context`]
#[derive(Debug, Clone)]
pub struct CreateContextOptions {
    pub headers: HeaderMap,
    pub db: DbClient,
    pub auth: Option<AuthService>,
    pub storage: Option<StorageClient>,
}

pub fn create_inner_context(options: CreateContextOptions) -> RequestContext {
    RequestContext {
        headers: options.headers,
        db: options.db,
        auth: options.auth,
        storage: options.storage,
    }
}

/// Context backed by the platform bindings
///
/// The database, bucket and auth clients are derived from `bindings` on every
/// call; nothing is cached between requests.
pub fn create_context(headers: HeaderMap, bindings: &Bindings) -> RequestContext {
    let db = create_db(&bindings.db);
    let storage = create_storage(&bindings.bucket);

    let auth = create_auth(
        AuthOptions::builder()
            .db(db.clone())
            .maybe_secret(bindings.auth_secret.clone())
            .maybe_base_url(bindings.auth_url.clone())
            .build(),
    );

    create_inner_context(CreateContextOptions {
        headers,
        db,
        auth: Some(auth),
        storage: Some(storage),
    })
}

/// Context for local development without any bindings
///
/// Construction always succeeds; the database rejects every query with
/// `NotInitialized` and neither auth nor storage is available.
pub fn create_context_local(headers: HeaderMap) -> RequestContext {
    create_inner_context(CreateContextOptions {
        headers,
        db: DbClient::uninitialized(),
        auth: None,
        storage: None,
    })
}
