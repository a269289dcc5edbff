//! The driver-facing backend trait.
//!
//! This module defines the [`DatabaseBackend`] trait that the MySQL,
//! PostgreSQL and SQLite drivers implement. Backends receive SQL whose
//! placeholders are already in the dialect's final form and hand back a
//! [`QueryOutput`] normalized by statement kind.

use std::fmt::Display;

use strata_core::StrataError;
use strata_core::StrataResult;
use strata_db::dialect::Dialect;
use strata_db::executor::QueryOutput;
use strata_db::value::Value;

/// A connected database engine.
///
/// All methods are async because database operations are I/O-bound. Even
/// the SQLite backend, built on a synchronous driver, runs its work through
/// `spawn_blocking` to keep the interface uniform.
#[async_trait::async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Returns the vendor name (`"mysql"`, `"postgresql"` or `"sqlite"`).
    fn vendor(&self) -> &str;

    /// The dialect this backend speaks.
    fn dialect(&self) -> Dialect;

    /// Runs one statement and normalizes its result.
    ///
    /// INSERT yields the generated id, UPDATE / DELETE whether any row was
    /// touched, DDL a completion marker and SELECT its rows.
    async fn query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput>;

    /// Quotes `value` as a literal of this dialect, for traces only.
    fn escape(&self, value: &Value) -> String {
        self.dialect().escape(value)
    }

    /// Whether the configured database / schema exists on the server.
    async fn schema_exists(&self) -> StrataResult<bool>;

    /// Creates the configured database / schema. Returns `false` when the
    /// engine has nothing to create.
    async fn create_schema(&self) -> StrataResult<bool>;

    /// Releases every connection held by the backend.
    async fn close(&self) -> StrataResult<()>;
}

/// Logs a failed statement and wraps the driver's error.
pub(crate) fn driver_error(vendor: &str, sql: &str, err: impl Display) -> StrataError {
    tracing::error!(vendor, sql, error = %err, "query failed");
    StrataError::DriverError(format!("{vendor} query error: {err}"))
}

/// Logs a connection failure and wraps the driver's error.
pub(crate) fn connection_error(vendor: &str, err: impl Display) -> StrataError {
    tracing::error!(vendor, error = %err, "connection failed");
    StrataError::DriverError(format!("{vendor} connection error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_wraps_message() {
        let err = driver_error("sqlite", "SELEC 1", "syntax error");
        assert!(err.is_driver());
        assert_eq!(
            err.to_string(),
            StrataError::DriverError("sqlite query error: syntax error".into()).to_string()
        );
    }

    #[test]
    fn test_connection_error_is_driver_error() {
        assert!(connection_error("mysql", "refused").is_driver());
    }
}
