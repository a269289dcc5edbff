//! The accumulated state of one query under construction.

use strata_core::{StrataError, StrataResult};

use super::clause::Conditions;
use super::join::JoinClause;
use crate::value::Value;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Parses `asc` / `desc` in any case.
    pub fn parse(raw: &str) -> StrataResult<Self> {
        match raw.trim().to_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(StrataError::InvalidArgument(format!(
                "Invalid order direction: {raw}"
            ))),
        }
    }

    /// The SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// Everything a builder has collected, independent of dialect.
///
/// The compiler reads this; only the builder writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub table: String,
    /// Selected columns; empty means `*`.
    pub fields: Vec<String>,
    /// WHERE and OR-WHERE clauses.
    pub conditions: Conditions,
    pub joins: Vec<JoinClause>,
    pub group_by: Vec<String>,
    /// HAVING and OR-HAVING clauses.
    pub having: Conditions,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Table-level index hints (MySQL only).
    pub index_hints: Vec<String>,
}

impl QueryState {
    /// Creates empty state for `table`.
    pub fn new(table: &str) -> StrataResult<Self> {
        let table = table.trim();
        if table.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Table name must be a non-empty string".to_string(),
            ));
        }
        Ok(Self {
            table: table.to_string(),
            fields: Vec::new(),
            conditions: Conditions::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            having: Conditions::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            index_hints: Vec::new(),
        })
    }

    /// Returns `true` once anything beyond the table has been set.
    pub fn has_clauses(&self) -> bool {
        !self.fields.is_empty()
            || !self.conditions.is_empty()
            || !self.joins.is_empty()
            || !self.group_by.is_empty()
            || !self.having.is_empty()
            || !self.order_by.is_empty()
            || self.limit.is_some()
            || self.offset.is_some()
            || !self.index_hints.is_empty()
    }

    /// Bound values in placeholder order: WHERE, OR-WHERE, HAVING, OR-HAVING.
    pub fn bindings(&self) -> Vec<Value> {
        let mut out = self.conditions.values();
        self.having.collect_values(&mut out);
        out
    }
}
