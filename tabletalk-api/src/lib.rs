pub mod handlers;
pub mod models;
pub mod rate_limit;

pub use tabletalk_core::DbConnection;
