use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::{
    adapters::inbound::http::{
        context::create_context,
        dto::{
            AuthErrorDto, SessionResponseDto, SignInResponseDto, SignUpResponseDto, SuccessDto,
            VerifyEmailQuery, VerifyEmailResponseDto,
        },
        router::AppState,
    },
    domain::errors::AuthError,
    services::{session_token_from_headers, AuthService, RequestMeta, SignInEmail, SignUpEmail},
};

type AuthFailure = (StatusCode, Json<AuthErrorDto>);

fn auth_failure(err: AuthError) -> AuthFailure {
    let status = err.status();
    if status.is_server_error() {
        error!(error = %err, "Auth request failed");
    } else {
        debug!(code = err.code(), "Auth request rejected");
    }
    (status, Json(AuthErrorDto::from_auth_error(&err)))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AuthFailure> {
    serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(AuthErrorDto::invalid_body(&e))))
}

/// Every verb under `/api/auth/*`
pub async fn auth_handler(
    State(app_state): State<AppState>,
    Path(rest): Path<String>,
    method: Method,
    headers: HeaderMap,
    Query(verify): Query<VerifyEmailQuery>,
    body: Bytes,
) -> Result<Response, AuthFailure> {
    let Some(bindings) = app_state.bindings.as_ref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AuthErrorDto::not_configured()),
        ));
    };

    let ctx = create_context(headers, bindings);
    let Some(auth) = ctx.auth.as_ref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AuthErrorDto::not_configured()),
        ));
    };

    let endpoint = rest.trim_matches('/');
    match endpoint {
        "sign-up/email" if method == Method::POST => sign_up(auth, &ctx.headers, &body).await,
        "sign-in/email" if method == Method::POST => sign_in(auth, &ctx.headers, &body).await,
        "sign-out" if method == Method::POST => sign_out(auth, &ctx.headers).await,
        "get-session" if method == Method::GET => get_session(auth, &ctx.headers).await,
        "verify-email" if method == Method::GET => verify_email(auth, verify.token).await,
        "sign-up/email" | "sign-in/email" | "sign-out" | "get-session" | "verify-email" => Err((
            StatusCode::METHOD_NOT_ALLOWED,
            Json(AuthErrorDto::new(
                "METHOD_NOT_SUPPORTED",
                format!("{} is not supported on /{}", method, endpoint),
            )),
        )),
        _ => Err((StatusCode::NOT_FOUND, Json(AuthErrorDto::not_found(endpoint)))),
    }
}

async fn sign_up(
    auth: &AuthService,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, AuthFailure> {
    auth.check_origin(headers).map_err(auth_failure)?;
    let input: SignUpEmail = parse_body(body)?;

    let outcome = auth
        .sign_up_email(input, &RequestMeta::from_headers(headers))
        .await
        .map_err(auth_failure)?;

    let response = SignUpResponseDto {
        token: outcome.session.as_ref().map(|s| s.token.clone()),
        user: outcome.user,
    };

    match outcome.session {
        Some(session) => {
            let cookie = auth.session_cookie(&session).map_err(auth_failure)?;
            Ok(([(header::SET_COOKIE, cookie)], Json(response)).into_response())
        }
        None => Ok(Json(response).into_response()),
    }
}

async fn sign_in(
    auth: &AuthService,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, AuthFailure> {
    auth.check_origin(headers).map_err(auth_failure)?;
    let input: SignInEmail = parse_body(body)?;

    let signed_in = auth
        .sign_in_email(input, &RequestMeta::from_headers(headers))
        .await
        .map_err(auth_failure)?;
    let cookie = auth.session_cookie(&signed_in.session).map_err(auth_failure)?;

    let response = SignInResponseDto {
        redirect: false,
        token: signed_in.session.token,
        url: None,
        user: signed_in.user,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(response)).into_response())
}

async fn sign_out(auth: &AuthService, headers: &HeaderMap) -> Result<Response, AuthFailure> {
    auth.check_origin(headers).map_err(auth_failure)?;

    if let Some(signed) = session_token_from_headers(headers) {
        auth.sign_out(&signed).await.map_err(auth_failure)?;
    }

    Ok((
        [(header::SET_COOKIE, auth.clear_session_cookie())],
        Json(SuccessDto { success: true }),
    )
        .into_response())
}

async fn get_session(auth: &AuthService, headers: &HeaderMap) -> Result<Response, AuthFailure> {
    let Some(session) = auth.session_from_headers(headers).await.map_err(auth_failure)? else {
        return Ok(Json(Option::<SessionResponseDto>::None).into_response());
    };

    if session.renewed {
        let cookie = auth.session_cookie(&session.session).map_err(auth_failure)?;
        return Ok((
            [(header::SET_COOKIE, cookie)],
            Json(Some(SessionResponseDto::from(session))),
        )
            .into_response());
    }

    Ok(Json(Some(SessionResponseDto::from(session))).into_response())
}

async fn verify_email(auth: &AuthService, token: Option<String>) -> Result<Response, AuthFailure> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| auth_failure(AuthError::InvalidToken))?;

    let user = auth.verify_email(&token).await.map_err(auth_failure)?;
    Ok(Json(VerifyEmailResponseDto { status: true, user }).into_response())
}
