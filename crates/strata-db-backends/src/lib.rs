//! # strata-db-backends
//!
//! Database drivers and the connection manager for strata. Each driver
//! implements [`DatabaseBackend`] and is compiled in through a cargo feature:
//!
//! - `sqlite` (default) - `rusqlite`, run on the blocking pool
//! - `postgres` - `tokio-postgres` through a `deadpool-postgres` pool
//! - `mysql` - `mysql_async` with its built-in pool
//!
//! [`ConnectionManager`] picks the driver named by the settings, opens it on
//! first use and implements [`DbExecutor`](strata_db::DbExecutor) so query
//! builders can run against it.

#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::significant_drop_tightening,
    clippy::doc_markdown
)]

pub mod base;
pub mod manager;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::DatabaseBackend;
pub use manager::{driver_compiled, ConnectionManager, MIGRATIONS_TABLE};
#[cfg(feature = "mysql")]
pub use mysql::MySqlBackend;
#[cfg(feature = "postgres")]
pub use postgresql::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
