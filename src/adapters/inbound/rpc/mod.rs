//! Typed remote procedures over the request context.

pub mod app_router;
pub mod error;
pub mod procedure;
pub mod transformer;

pub use app_router::app_router;
pub use error::{flatten_validation_errors, format_error, ErrorCause, ProcedureError, RpcErrorCode};
pub use procedure::{decode_input, NoInput, ProcedureKind, ProcedureResult, ProcedureRouter};
pub use transformer::{RichValue, TransformError};
