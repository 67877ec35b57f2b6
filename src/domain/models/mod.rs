pub mod auth;
pub mod object;

pub use auth::*;
pub use object::*;
