//! # strata
//!
//! A fluent, dialect-aware SQL query builder for MySQL, PostgreSQL and
//! SQLite.
//!
//! This meta-crate re-exports the sub-crates. Depend on `strata` for the
//! whole stack, or on the individual crates for finer-grained control.
//! Drivers are selected with the `sqlite` (default), `postgres` and `mysql`
//! features.
//!
//! ```no_run
//! use strata::prelude::*;
//!
//! # async fn demo() -> StrataResult<()> {
//! let db = ConnectionManager::from_settings(&DatabaseSettings::sqlite_memory())?;
//! let adults = QueryBuilder::table(&db, "users")?
//!     .where_op("age", ">=", 18)?
//!     .order_by("name", "ASC")?
//!     .get()
//!     .await?;
//! # let _ = adults;
//! # Ok(())
//! # }
//! ```

/// Settings, logging and the error type.
pub use strata_core as core;

/// Values, dialects, the query builder and its compiler, model policies.
pub use strata_db as db;

/// Drivers and the connection manager.
pub use strata_db_backends as db_backends;

/// Schema blueprints and the migration runner.
#[cfg(feature = "migrations")]
pub use strata_db_migrations as db_migrations;

pub use async_trait::async_trait;
pub use chrono;
pub use serde_json;
pub use tokio;
pub use tracing;

/// The types most applications touch.
pub mod prelude {
    pub use strata_core::{DatabaseSettings, Settings, StrataError, StrataResult};
    pub use strata_db::{
        CompiledQuery, Dialect, Eloquent, Model, ModelInstance, ModelMeta, QueryBuilder,
        QueryOutput, Record, Row, Value,
    };
    pub use strata_db_backends::ConnectionManager;

    #[cfg(feature = "migrations")]
    pub use strata_db_migrations::{
        Blueprint, ColumnOptions, ForeignKey, Migration, MigrationRunner,
    };
}

/// Installs the tracing subscriber and builds a connection manager for the
/// configured dialect. No connection is opened until the first query.
pub fn bootstrap(
    settings: &strata_core::Settings,
) -> strata_core::StrataResult<db_backends::ConnectionManager> {
    strata_core::logging::setup_logging(settings);
    db_backends::ConnectionManager::from_settings(&settings.database)
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::prelude::*;

    #[tokio::test]
    async fn test_bootstrap_sqlite_memory() {
        let mut settings = Settings::default();
        settings.database = DatabaseSettings::sqlite_memory();
        let db = super::bootstrap(&settings).unwrap();
        assert_eq!(db.dialect(), Dialect::Sqlite);
        assert!(!db.is_connected().await);

        db.run_query("CREATE TABLE t (id INTEGER PRIMARY KEY, n INTEGER)", &[])
            .await
            .unwrap();
        QueryBuilder::table(&db, "t")
            .unwrap()
            .insert(Record::new().set("n", 7), false)
            .await
            .unwrap();
        let rows = QueryBuilder::table(&db, "t")
            .unwrap()
            .where_op("n", "=", 7)
            .unwrap()
            .get()
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(db.is_connected().await);
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let mut settings = Settings::default();
        settings.database.dialect = "oracle".to_string();
        assert!(matches!(
            super::bootstrap(&settings),
            Err(StrataError::UnsupportedDialect(_))
        ));
    }
}
