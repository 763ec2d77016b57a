//! Database backend implementations.
//!
//! Each backend lives in its own file behind a feature flag.

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "duckdb")]
pub use self::duckdb::DuckDbExecutor;
