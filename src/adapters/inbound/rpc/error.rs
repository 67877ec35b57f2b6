use http::StatusCode;
use serde_json::{json, Map as JsonMap, Value};
use std::collections::BTreeMap;
use validator::{ValidationErrors, ValidationErrorsKind};

use super::transformer::TransformError;
use crate::domain::errors::{AuthError, DatabaseError, StorageError};

/// Procedure error codes with their JSON-RPC number and HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorCode {
    ParseError,
    BadRequest,
    InternalServerError,
    NotImplemented,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
}

impl RpcErrorCode {
    pub fn json_rpc_code(self) -> i32 {
        match self {
            RpcErrorCode::ParseError => -32700,
            RpcErrorCode::BadRequest => -32600,
            RpcErrorCode::InternalServerError | RpcErrorCode::NotImplemented => -32603,
            RpcErrorCode::Unauthorized => -32001,
            RpcErrorCode::Forbidden => -32003,
            RpcErrorCode::NotFound => -32004,
            RpcErrorCode::MethodNotSupported => -32005,
            RpcErrorCode::Timeout => -32008,
            RpcErrorCode::Conflict => -32009,
            RpcErrorCode::PreconditionFailed => -32012,
            RpcErrorCode::PayloadTooLarge => -32013,
            RpcErrorCode::UnprocessableContent => -32022,
            RpcErrorCode::TooManyRequests => -32029,
            RpcErrorCode::ClientClosedRequest => -32099,
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            RpcErrorCode::ParseError | RpcErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            RpcErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            RpcErrorCode::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            RpcErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            RpcErrorCode::Forbidden => StatusCode::FORBIDDEN,
            RpcErrorCode::NotFound => StatusCode::NOT_FOUND,
            RpcErrorCode::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            RpcErrorCode::Timeout => StatusCode::REQUEST_TIMEOUT,
            RpcErrorCode::Conflict => StatusCode::CONFLICT,
            RpcErrorCode::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            RpcErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RpcErrorCode::UnprocessableContent => StatusCode::UNPROCESSABLE_ENTITY,
            RpcErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            // 499 has no named constant
            RpcErrorCode::ClientClosedRequest => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
        }
    }
}

/// The underlying failure behind a procedure error
#[derive(Debug, thiserror::Error)]
pub enum ErrorCause {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Input(#[from] serde_json::Error),
}

/// Error raised by a procedure or by the router while dispatching it
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProcedureError {
    pub code: RpcErrorCode,
    pub message: String,
    #[source]
    pub cause: Option<ErrorCause>,
}

impl ProcedureError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<ErrorCause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalServerError, message)
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match &self.cause {
            Some(ErrorCause::Validation(errors)) => Some(errors),
            Some(ErrorCause::Auth(AuthError::Validation(errors))) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for ProcedureError {
    fn from(errors: ValidationErrors) -> Self {
        Self::bad_request("Input validation failed").with_cause(errors)
    }
}

impl From<TransformError> for ProcedureError {
    fn from(err: TransformError) -> Self {
        Self::new(RpcErrorCode::ParseError, err.to_string()).with_cause(err)
    }
}

impl From<serde_json::Error> for ProcedureError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("Invalid input: {}", err)).with_cause(err)
    }
}

impl From<DatabaseError> for ProcedureError {
    fn from(err: DatabaseError) -> Self {
        Self::internal(err.to_string()).with_cause(err)
    }
}

impl From<StorageError> for ProcedureError {
    fn from(err: StorageError) -> Self {
        let code = match &err {
            StorageError::InvalidKey { .. }
            | StorageError::UnsupportedKey { .. }
            | StorageError::InvalidListLimit { .. }
            | StorageError::InvalidCursor => RpcErrorCode::BadRequest,
            _ => RpcErrorCode::InternalServerError,
        };
        Self::new(code, err.to_string()).with_cause(err)
    }
}

impl From<AuthError> for ProcedureError {
    fn from(err: AuthError) -> Self {
        let code = match err.status() {
            StatusCode::BAD_REQUEST => RpcErrorCode::BadRequest,
            StatusCode::UNAUTHORIZED => RpcErrorCode::Unauthorized,
            StatusCode::FORBIDDEN => RpcErrorCode::Forbidden,
            StatusCode::UNPROCESSABLE_ENTITY => RpcErrorCode::UnprocessableContent,
            _ => RpcErrorCode::InternalServerError,
        };
        Self::new(code, err.to_string()).with_cause(err)
    }
}

/// Flatten nested validator errors into form-level and per-field messages
///
/// Nested fields use dotted paths (`address.city`, `items.0.name`). Errors
/// registered under `__all__` are form-level.
pub fn flatten_validation_errors(errors: &ValidationErrors) -> Value {
    let mut form_errors = Vec::new();
    let mut field_errors = BTreeMap::new();
    collect_errors(errors, None, &mut form_errors, &mut field_errors);

    json!({
        "formErrors": form_errors,
        "fieldErrors": field_errors,
    })
}

fn collect_errors(
    errors: &ValidationErrors,
    prefix: Option<&str>,
    form_errors: &mut Vec<String>,
    field_errors: &mut BTreeMap<String, Vec<String>>,
) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, field),
            None => field.to_string(),
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = list.iter().map(error_message);
                if &**field == "__all__" && prefix.is_none() {
                    form_errors.extend(messages);
                } else {
                    field_errors.entry(path).or_default().extend(messages);
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                collect_errors(nested, Some(&path), form_errors, field_errors);
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let item_path = format!("{}.{}", path, index);
                    collect_errors(nested, Some(&item_path), form_errors, field_errors);
                }
            }
        }
    }
}

fn error_message(error: &validator::ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }

    let param = |name: &str| error.params.get(name).map(|v| v.to_string());
    match error.code.as_ref() {
        "email" => "Invalid email".to_string(),
        "url" => "Invalid url".to_string(),
        "required" => "Required".to_string(),
        "length" | "range" => match (param("min"), param("max")) {
            (Some(min), Some(max)) => format!("Must be between {} and {}", min, max),
            (Some(min), None) => format!("Must be at least {}", min),
            (None, Some(max)) => format!("Must be at most {}", max),
            (None, None) => "Invalid value".to_string(),
        },
        code => format!("Invalid value ({})", code),
    }
}

/// Client-facing error shape
///
/// `{message, code, data: {code, httpStatus, path, validationError}}` where
/// the outer `code` is the JSON-RPC number and `data.code` the symbolic name.
pub fn format_error(err: &ProcedureError, path: Option<&str>) -> Value {
    let validation_error = err
        .validation_errors()
        .map(flatten_validation_errors)
        .unwrap_or(Value::Null);

    let mut data = JsonMap::new();
    data.insert("code".into(), Value::String(err.code.to_string()));
    data.insert("httpStatus".into(), json!(err.code.http_status().as_u16()));
    data.insert(
        "path".into(),
        path.map_or(Value::Null, |p| Value::String(p.to_string())),
    );
    data.insert("validationError".into(), validation_error);

    json!({
        "message": err.message,
        "code": err.code.json_rpc_code(),
        "data": Value::Object(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct Address {
        #[validate(length(min = 1, message = "City is required"))]
        city: String,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Item {
        #[validate(range(min = 1))]
        quantity: u32,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Order {
        #[validate(email)]
        email: String,
        #[validate(length(min = 2, message = "Name is too short"))]
        name: String,
        #[validate(nested)]
        address: Address,
        #[validate(nested)]
        items: Vec<Item>,
    }

    #[test]
    fn test_code_table() {
        assert_eq!(RpcErrorCode::BadRequest.to_string(), "BAD_REQUEST");
        assert_eq!(RpcErrorCode::NotFound.json_rpc_code(), -32004);
        assert_eq!(
            RpcErrorCode::MethodNotSupported.http_status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(RpcErrorCode::ClientClosedRequest.http_status().as_u16(), 499);
        assert_eq!(
            "PRECONDITION_FAILED".parse::<RpcErrorCode>().unwrap(),
            RpcErrorCode::PreconditionFailed
        );
    }

    #[test]
    fn test_validation_error_lists_only_invalid_fields() {
        let order = Order {
            email: "not-an-email".into(),
            name: "Ada".into(),
            address: Address { city: String::new() },
            items: vec![Item { quantity: 1 }, Item { quantity: 0 }],
        };
        let err = ProcedureError::from(order.validate().unwrap_err());

        let shape = format_error(&err, Some("order.create"));
        assert_eq!(shape["code"], json!(-32600));
        assert_eq!(shape["data"]["code"], json!("BAD_REQUEST"));
        assert_eq!(shape["data"]["httpStatus"], json!(400));
        assert_eq!(shape["data"]["path"], json!("order.create"));

        let validation = &shape["data"]["validationError"];
        assert_eq!(validation["formErrors"], json!([]));
        let fields = validation["fieldErrors"].as_object().unwrap();
        let mut keys = fields.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(keys, vec!["address.city", "email", "items.1.quantity"]);
        assert_eq!(fields["address.city"], json!(["City is required"]));
        assert_eq!(fields["email"], json!(["Invalid email"]));
    }

    #[test]
    fn test_non_validation_errors_have_null_details() {
        let err = ProcedureError::from(DatabaseError::NotInitialized);
        let shape = format_error(&err, None);
        assert_eq!(shape["data"]["code"], json!("INTERNAL_SERVER_ERROR"));
        assert_eq!(shape["data"]["path"], Value::Null);
        assert_eq!(shape["data"]["validationError"], Value::Null);
    }

    #[test]
    fn test_auth_errors_map_by_status() {
        assert_eq!(
            ProcedureError::from(AuthError::InvalidCredentials).code,
            RpcErrorCode::Unauthorized
        );
        assert_eq!(
            ProcedureError::from(AuthError::UserAlreadyExists).code,
            RpcErrorCode::UnprocessableContent
        );
        assert_eq!(
            ProcedureError::from(StorageError::InvalidCursor).code,
            RpcErrorCode::BadRequest
        );
    }

    #[test]
    fn test_form_level_errors() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "__all__",
            validator::ValidationError::new("mismatch").with_message("Passwords differ".into()),
        );
        let flat = flatten_validation_errors(&errors);
        assert_eq!(flat["formErrors"], json!(["Passwords differ"]));
        assert_eq!(flat["fieldErrors"], json!({}));
    }
}
