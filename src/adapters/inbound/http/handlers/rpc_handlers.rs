use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use futures::future::join_all;
use serde_json::{json, Value};

use crate::adapters::inbound::{
    http::{
        context::{create_context, create_context_local, RequestContext},
        dto::RpcQueryDto,
        router::AppState,
    },
    rpc::{format_error, ProcedureError, ProcedureKind, RichValue, RpcErrorCode},
};

/// `GET /api/trpc/{path}`: queries, input in the query string
pub async fn rpc_query(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<RpcQueryDto>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let raw_input = params.input.as_deref().map(str::as_bytes).unwrap_or_default();
    dispatch(&app_state, ProcedureKind::Query, &path, &params, raw_input, headers).await
}

/// `POST /api/trpc/{path}`: mutations, input as the request body
pub async fn rpc_mutation(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<RpcQueryDto>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    dispatch(&app_state, ProcedureKind::Mutation, &path, &params, &body, headers).await
}

fn request_context(app_state: &AppState, headers: HeaderMap) -> RequestContext {
    match &app_state.bindings {
        Some(bindings) => create_context(headers, bindings),
        None => create_context_local(headers),
    }
}

fn parse_json(raw: &[u8]) -> Result<Option<Value>, ProcedureError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(raw)
        .map(Some)
        .map_err(|e| ProcedureError::new(RpcErrorCode::ParseError, format!("Invalid JSON input: {}", e)))
}

fn decode_envelope(envelope: Option<Value>) -> Result<RichValue, ProcedureError> {
    match envelope {
        None => Ok(RichValue::Undefined),
        Some(envelope) => Ok(RichValue::from_envelope(envelope)?),
    }
}

/// Inputs for each call of the request, in path order
fn batch_inputs(
    raw: &[u8],
    count: usize,
    batch: bool,
) -> Result<Vec<Result<RichValue, ProcedureError>>, ProcedureError> {
    let parsed = parse_json(raw)?;

    if !batch {
        return Ok(vec![decode_envelope(parsed)]);
    }

    let mut inputs = match parsed {
        None => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ProcedureError::bad_request(
                "Batch input must be an object keyed by call index",
            ))
        }
    };

    Ok((0..count)
        .map(|index| decode_envelope(inputs.remove(&index.to_string())))
        .collect())
}

fn success_body(value: &RichValue) -> Value {
    json!({ "result": { "data": value.to_envelope() } })
}

fn error_body(err: &ProcedureError, path: Option<&str>) -> Value {
    let shape = RichValue::from_json(format_error(err, path));
    json!({ "error": shape.to_envelope() })
}

async fn dispatch(
    app_state: &AppState,
    kind: ProcedureKind,
    path: &str,
    params: &RpcQueryDto,
    raw_input: &[u8],
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let batch = params.is_batch();
    let paths = if batch {
        path.split(',').collect::<Vec<_>>()
    } else {
        vec![path]
    };

    let inputs = match batch_inputs(raw_input, paths.len(), batch) {
        Ok(inputs) => inputs,
        Err(err) => {
            let status = err.code.http_status();
            return (status, Json(error_body(&err, None)));
        }
    };

    let ctx = request_context(app_state, headers);
    let procedures = &app_state.procedures;

    let calls = paths.iter().copied().zip(inputs).map(|(path, input)| {
        let ctx = ctx.clone();
        async move {
            let result = match input {
                Ok(input) => procedures.call(path, kind, ctx, input).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(value) => (StatusCode::OK, success_body(&value)),
                Err(err) => (err.code.http_status(), error_body(&err, Some(path))),
            }
        }
    });
    let results = join_all(calls).await;

    if !batch {
        let Some((status, body)) = results.into_iter().next() else {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null));
        };
        return (status, Json(body));
    }

    let first = results.first().map(|(status, _)| *status);
    let status = match first {
        Some(first) if results.iter().all(|(s, _)| *s == first) => first,
        Some(_) => StatusCode::MULTI_STATUS,
        None => StatusCode::OK,
    };
    let bodies = results.into_iter().map(|(_, body)| body).collect();
    (status, Json(Value::Array(bodies)))
}
