pub mod auth_handlers;
pub mod rpc_handlers;
pub mod system_handlers;

pub use auth_handlers::*;
pub use rpc_handlers::*;
pub use system_handlers::*;
