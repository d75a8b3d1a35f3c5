pub mod config;
pub mod datum;
pub mod error;
pub mod schema;
pub mod types;

pub use error::{DbError, DbResult, StoreError, StoreResult};
