mod auth_errors;
mod config_errors;
mod database_errors;
mod storage_errors;
mod validation_errors;

pub use auth_errors::*;
pub use config_errors::*;
pub use database_errors::*;
pub use storage_errors::*;
pub use validation_errors::*;
