//! Core error types for strata.
//!
//! Every fallible operation in the workspace returns [`StrataResult`]. The
//! variants separate caller mistakes (bad arguments, bad builder state,
//! mass-assignment violations) from configuration problems and failures
//! reported by a database driver.

use thiserror::Error;

/// The primary error type for strata.
#[derive(Error, Debug)]
pub enum StrataError {
    // ── Builder validation ───────────────────────────────────────────

    /// An argument failed validation (unknown operator, empty column list,
    /// non-positive limit, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was called in an order the builder does not allow, such
    /// as `or_where` before any `where` or `insert` after a clause was added.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // ── Mass assignment ──────────────────────────────────────────────

    /// A payload key appears in the model's guarded list.
    #[error("Field '{0}' is guarded and cannot be mass-assigned")]
    GuardedField(String),

    /// A payload key is not in the model's fillable list.
    #[error("Field '{0}' is not fillable")]
    NotFillable(String),

    /// A payload key is present without a value.
    #[error("Field '{0}' has an undefined value")]
    UndefinedValue(String),

    // ── Configuration ────────────────────────────────────────────────

    /// The configured dialect is unknown or was not compiled in.
    #[error("Unsupported database dialect: {0}")]
    UnsupportedDialect(String),

    /// A configuration error (missing or invalid settings).
    #[error("Improperly configured: {0}")]
    ConfigurationError(String),

    // ── Execution ────────────────────────────────────────────────────

    /// Connectivity or SQL failure reported by a driver.
    #[error("Driver error: {0}")]
    DriverError(String),

    /// A lookup that requires a row found none.
    #[error("Record does not exist: {0}")]
    DoesNotExist(String),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

impl StrataError {
    /// Returns `true` for errors caused by the caller's input rather than the
    /// database or environment.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::InvalidState(_)
                | Self::GuardedField(_)
                | Self::NotFillable(_)
                | Self::UndefinedValue(_)
        )
    }

    /// Returns `true` for mass-assignment violations.
    pub const fn is_mass_assignment(&self) -> bool {
        matches!(
            self,
            Self::GuardedField(_) | Self::NotFillable(_) | Self::UndefinedValue(_)
        )
    }

    /// Returns `true` for failures reported by a database driver.
    pub const fn is_driver(&self) -> bool {
        matches!(self, Self::DriverError(_))
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for results using [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            StrataError::InvalidArgument("limit must be positive".into()).to_string(),
            "Invalid argument: limit must be positive"
        );
        assert_eq!(
            StrataError::GuardedField("password".into()).to_string(),
            "Field 'password' is guarded and cannot be mass-assigned"
        );
        assert_eq!(
            StrataError::UnsupportedDialect("oracle".into()).to_string(),
            "Unsupported database dialect: oracle"
        );
    }

    #[test]
    fn test_classification() {
        assert!(StrataError::InvalidState("x".into()).is_validation());
        assert!(StrataError::NotFillable("x".into()).is_validation());
        assert!(StrataError::NotFillable("x".into()).is_mass_assignment());
        assert!(!StrataError::InvalidArgument("x".into()).is_mass_assignment());
        assert!(StrataError::DriverError("x".into()).is_driver());
        assert!(!StrataError::DriverError("x".into()).is_validation());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StrataError = io.into();
        assert!(matches!(err, StrataError::IoError(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err: StrataError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, StrataError::SerializationError(_)));
    }

    #[test]
    fn test_result_alias() {
        fn lookup(found: bool) -> StrataResult<u8> {
            if found {
                Ok(1)
            } else {
                Err(StrataError::DoesNotExist("users.id = 7".into()))
            }
        }
        assert_eq!(lookup(true).unwrap(), 1);
        assert!(lookup(false).is_err());
    }
}
