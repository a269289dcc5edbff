//! Write-side policies attached to model metadata.
//!
//! [`MassAssignmentGuard`] checks payload keys against a model's guarded and
//! fillable lists. [`SoftDeletePolicy`] hides soft-deleted rows from reads
//! and turns deletes into timestamp updates.

use strata_core::{StrataError, StrataResult};

use crate::model::ModelMeta;
use crate::query::clause::Predicate;
use crate::query::state::QueryState;
use crate::row::Record;
use crate::value::Value;

/// Column that marks a row as soft-deleted.
pub const SOFT_DELETE_COLUMN: &str = "deleted_at";

/// Validates write payloads against a model's assignment rules.
#[derive(Debug, Clone, Copy)]
pub struct MassAssignmentGuard<'m> {
    meta: &'m ModelMeta,
}

impl<'m> MassAssignmentGuard<'m> {
    /// Creates a guard for `meta`.
    pub const fn new(meta: &'m ModelMeta) -> Self {
        Self { meta }
    }

    /// Whether `column` may be mass-assigned.
    ///
    /// Soft-delete models implicitly accept the soft-delete column; the
    /// declared metadata is left untouched.
    pub fn is_fillable(&self, column: &str) -> bool {
        self.meta.fillable.iter().any(|f| *f == column)
            || (self.meta.soft_delete && column == SOFT_DELETE_COLUMN)
    }

    /// Checks every key of every record, stopping at the first violation.
    ///
    /// For each key the guarded list is consulted first, then the fillable
    /// list, then the value itself.
    pub fn validate(&self, records: &[Record]) -> StrataResult<()> {
        for record in records {
            for (column, value) in record.iter() {
                if self.meta.guarded.iter().any(|g| *g == column) {
                    return Err(StrataError::GuardedField(column.to_string()));
                }
                if !self.is_fillable(column) {
                    return Err(StrataError::NotFillable(column.to_string()));
                }
                if value.is_none() {
                    return Err(StrataError::UndefinedValue(column.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Soft-delete behaviour for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftDeletePolicy {
    column: &'static str,
}

impl SoftDeletePolicy {
    /// The policy for `meta`, if it opted into soft deletes.
    pub const fn for_model(meta: &ModelMeta) -> Option<Self> {
        if meta.soft_delete {
            Some(Self {
                column: SOFT_DELETE_COLUMN,
            })
        } else {
            None
        }
    }

    /// The marker column.
    pub const fn column(&self) -> &'static str {
        self.column
    }

    fn read_guard(&self) -> Predicate {
        Predicate::Null {
            column: self.column.to_string(),
            negated: false,
        }
    }

    /// Adds `column IS NULL` to the WHERE section unless it is already there.
    pub fn apply_read_guard(&self, state: &mut QueryState) {
        let guard = self.read_guard();
        if !state.conditions.contains(&guard) {
            state.conditions.push_and(guard, 0);
        }
    }

    /// The UPDATE payload that soft-deletes rows at `now`.
    pub fn deletion_payload(&self, now: chrono::NaiveDateTime) -> Record {
        Record::new().set(self.column, Value::DateTime(now))
    }
}
