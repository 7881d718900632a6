//! Bundled [`Driver`](crate::Driver) implementations.
//!
//! - [`SqliteDriver`] (feature `sqlite`, on by default)
//! - [`PgDriver`] (feature `postgres`)

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;

#[cfg(feature = "postgres")]
pub use postgres::PgDriver;
