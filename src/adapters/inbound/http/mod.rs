pub mod context;
pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use context::*;
pub use dto::*;
pub use handlers::*;
pub use middleware::*;
pub use router::*;
