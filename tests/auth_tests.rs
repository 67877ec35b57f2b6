use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use edge_app_server::{create_router, AppBuilder, AppState};
use serde_json::{json, Value};

const SECRET: &str = "integration-secret-0123456789abcdef";

async fn setup_test_server(auth_url: Option<&str>) -> TestServer {
    let mut builder = AppBuilder::new().with_migrations(true).with_auth_secret(SECRET);
    if let Some(url) = auth_url {
        builder = builder.with_auth_url(url);
    }
    let bindings = builder.build().await.unwrap();
    TestServer::new(create_router(AppState::new(bindings))).unwrap()
}

/// `name=value` part of the response's session cookie
fn session_cookie(response: &TestResponse) -> HeaderValue {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response should set the session cookie")
        .to_str()
        .unwrap();
    let pair = set_cookie.split(';').next().unwrap();
    assert!(pair.starts_with("auth.session_token="));
    HeaderValue::from_str(pair).unwrap()
}

async fn sign_up(server: &TestServer, email: &str) -> TestResponse {
    server
        .post("/api/auth/sign-up/email")
        .json(&json!({
            "name": "Ada Lovelace",
            "email": email,
            "password": "correct horse battery"
        }))
        .await
}

#[tokio::test]
async fn sign_up_sign_in_session_and_sign_out() {
    let server = setup_test_server(None).await;

    let response = sign_up(&server, "Ada@Example.com").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["email"], json!("ada@example.com"));
    assert_eq!(body["user"]["emailVerified"], json!(false));
    assert!(body["token"].is_string());
    assert!(body["user"].get("password").is_none());

    let response = server
        .post("/api/auth/sign-in/email")
        .json(&json!({"email": "ada@example.com", "password": "correct horse battery"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["redirect"], json!(false));
    assert_eq!(body["url"], Value::Null);
    let cookie = session_cookie(&response);

    let response = server
        .get("/api/auth/get-session")
        .add_header(header::COOKIE, cookie.clone())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["name"], json!("Ada Lovelace"));
    assert!(body["session"]["expiresAt"].is_string());

    let response = server
        .post("/api/auth/sign-out")
        .add_header(header::COOKIE, cookie.clone())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({"success": true}));
    let cleared = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = server
        .get("/api/auth/get-session")
        .add_header(header::COOKIE, cookie)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), Value::Null);
}

#[tokio::test]
async fn duplicate_sign_up_is_rejected() {
    let server = setup_test_server(None).await;
    sign_up(&server, "grace@example.com").await.assert_status_ok();

    let response = sign_up(&server, "grace@example.com").await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], json!("USER_ALREADY_EXISTS"));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let server = setup_test_server(None).await;
    sign_up(&server, "linus@example.com").await.assert_status_ok();

    let response = server
        .post("/api/auth/sign-in/email")
        .json(&json!({"email": "linus@example.com", "password": "wrong password"}))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], json!("INVALID_EMAIL_OR_PASSWORD"));
}

#[tokio::test]
async fn validation_errors_list_the_invalid_fields() {
    let server = setup_test_server(None).await;

    let response = server
        .post("/api/auth/sign-up/email")
        .json(&json!({"name": "Ada", "email": "not-an-email", "password": "short"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
    let fields = body["details"]["fieldErrors"].as_object().unwrap();
    let mut keys = fields.keys().cloned().collect::<Vec<_>>();
    keys.sort();
    assert_eq!(keys, vec!["email", "password"]);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let server = setup_test_server(None).await;

    let response = server
        .post("/api/auth/sign-in/email")
        .text("{not json")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], json!("INVALID_BODY"));
}

#[tokio::test]
async fn foreign_origin_is_forbidden() {
    let server = setup_test_server(Some("https://app.example.com")).await;

    let response = server
        .post("/api/auth/sign-up/email")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://evil.example.net"))
        .json(&json!({
            "name": "Mallory",
            "email": "mallory@example.com",
            "password": "correct horse battery"
        }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], json!("INVALID_ORIGIN"));

    let response = server
        .post("/api/auth/sign-up/email")
        .add_header(header::ORIGIN, HeaderValue::from_static("https://app.example.com"))
        .json(&json!({
            "name": "Alice",
            "email": "alice@example.com",
            "password": "correct horse battery"
        }))
        .await;
    response.assert_status_ok();
    let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.ends_with("; Secure"));
}

#[tokio::test]
async fn unknown_endpoints_and_methods() {
    let server = setup_test_server(None).await;

    server
        .get("/api/auth/unknown")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/api/auth/sign-in/email")
        .await
        .assert_status(StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn verify_email_with_bad_token() {
    let server = setup_test_server(None).await;

    let response = server.get("/api/auth/verify-email?token=nope").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], json!("INVALID_TOKEN"));

    server
        .get("/api/auth/verify-email")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forged_cookie_has_no_session() {
    let server = setup_test_server(None).await;

    let response = server
        .get("/api/auth/get-session")
        .add_header(
            HeaderName::from_static("cookie"),
            HeaderValue::from_static("auth.session_token=forged.c2lnbmF0dXJl"),
        )
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), Value::Null);
}
