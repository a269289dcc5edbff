//! JOIN clauses and the scoped builder handed to join callbacks.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;
use strata_core::{StrataError, StrataResult};

use super::clause::{Conditions, Conjunction, Operator, Predicate};
use crate::dialect::Dialect;
use crate::value::Value;

static COLUMN_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+\.\w+$").expect("valid regex"));

/// SQL JOIN types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
    /// RIGHT JOIN (not supported by older SQLite releases).
    Right,
    /// FULL JOIN (not supported by MySQL).
    Full,
    /// CROSS JOIN.
    Cross,
}

impl JoinType {
    /// Returns the SQL keyword for this join type.
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// Right-hand side of an `ON` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOperand {
    /// A `table.column` reference, rendered verbatim.
    Column(String),
    /// Anything else, rendered as a quoted string literal.
    Literal(String),
}

impl JoinOperand {
    /// Classifies `raw`: `table.column` shapes are column references.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if COLUMN_REFERENCE.is_match(trimmed) {
            Self::Column(trimmed.to_string())
        } else {
            Self::Literal(raw.to_string())
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Self::Column(column) => out.push_str(column),
            Self::Literal(text) => {
                let _ = write!(out, "'{}'", text.replace('\'', "''"));
            }
        }
    }
}

/// One `ON` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnCondition {
    pub column: String,
    pub operator: Operator,
    pub operand: JoinOperand,
    /// `None` for the first condition of a join.
    pub conjunction: Option<Conjunction>,
}

/// A JOIN as stored in the query state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub alias: Option<String>,
    pub join_type: JoinType,
    pub on: Vec<OnCondition>,
    pub index_hints: Vec<String>,
}

impl JoinClause {
    /// Parses `"table"`, `"table alias"` or `"table AS alias"`.
    pub fn new(target: &str, join_type: JoinType) -> StrataResult<Self> {
        let parts: Vec<&str> = target.split_whitespace().collect();
        let (table, alias) = match parts.as_slice() {
            [table] => (*table, None),
            [table, kw, alias] if kw.eq_ignore_ascii_case("as") => (*table, Some(*alias)),
            [table, alias] if !alias.eq_ignore_ascii_case("as") => (*table, Some(*alias)),
            [table, _] => (*table, None),
            _ => {
                return Err(StrataError::InvalidArgument(format!(
                    "Join table name is required, got '{target}'"
                )))
            }
        };
        Ok(Self {
            table: table.to_string(),
            alias: alias.map(str::to_string),
            join_type,
            on: Vec::new(),
            index_hints: Vec::new(),
        })
    }

    /// Renders ` TYPE JOIN table [AS alias][ USE INDEX(..)][ ON ...]`.
    ///
    /// Index hints are MySQL-only and silently dropped elsewhere.
    pub fn render(&self, dialect: Dialect, out: &mut String) {
        let _ = write!(out, " {} {}", self.join_type.sql_keyword(), self.table);
        if let Some(alias) = &self.alias {
            let _ = write!(out, " AS {alias}");
        }
        if dialect == Dialect::MySql && !self.index_hints.is_empty() {
            let _ = write!(out, " USE INDEX({})", self.index_hints.join(", "));
        }
        for condition in &self.on {
            match condition.conjunction {
                None => out.push_str(" ON "),
                Some(conj) => {
                    let _ = write!(out, " {} ", conj.as_sql());
                }
            }
            let _ = write!(out, "{} {} ", condition.column, condition.operator.as_sql());
            condition.operand.render(out);
        }
    }
}

/// Builder passed to join callbacks.
///
/// `on` conditions stay with the join. WHERE conditions added here are
/// written through to the enclosing query's WHERE section once the callback
/// returns; their conjunctions account for the clauses the query already
/// had.
#[derive(Debug)]
pub struct JoinBuilder {
    clause: JoinClause,
    parent_where: usize,
    conditions: Conditions,
}

impl JoinBuilder {
    /// Starts a join scope. `parent_where` is the number of primary WHERE
    /// clauses the enclosing query holds.
    pub fn new(target: &str, join_type: JoinType, parent_where: usize) -> StrataResult<Self> {
        Ok(Self {
            clause: JoinClause::new(target, join_type)?,
            parent_where,
            conditions: Conditions::new(),
        })
    }

    fn push_on(
        &mut self,
        column: &str,
        operator: &str,
        operand: &str,
        conjunction: Conjunction,
    ) -> StrataResult<&mut Self> {
        let operator = Operator::parse(operator)?;
        let column = column.trim();
        if column.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Join condition column must be a non-empty string".to_string(),
            ));
        }
        let conjunction = if self.clause.on.is_empty() {
            None
        } else {
            Some(conjunction)
        };
        self.clause.on.push(OnCondition {
            column: column.to_string(),
            operator,
            operand: JoinOperand::parse(operand),
            conjunction,
        });
        Ok(self)
    }

    /// `ON first = second`.
    pub fn on(&mut self, first: &str, second: &str) -> StrataResult<&mut Self> {
        self.push_on(first, "=", second, Conjunction::And)
    }

    /// `ON first op second`.
    pub fn on_op(&mut self, first: &str, operator: &str, second: &str) -> StrataResult<&mut Self> {
        self.push_on(first, operator, second, Conjunction::And)
    }

    /// `OR first = second`; requires a previous `on`.
    pub fn or_on(&mut self, first: &str, second: &str) -> StrataResult<&mut Self> {
        self.or_on_op(first, "=", second)
    }

    /// `OR first op second`; requires a previous `on`.
    pub fn or_on_op(&mut self, first: &str, operator: &str, second: &str) -> StrataResult<&mut Self> {
        if self.clause.on.is_empty() {
            return Err(StrataError::InvalidState(
                "No previous ON clause to apply OR condition".to_string(),
            ));
        }
        self.push_on(first, operator, second, Conjunction::Or)
    }

    fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        self.conditions.push_and(predicate, self.parent_where);
        self
    }

    fn or_where_predicate(&mut self, predicate: Predicate) -> StrataResult<&mut Self> {
        self.conditions.push_or(predicate, self.parent_where, "where")?;
        Ok(self)
    }

    /// `WHERE column = value` on the enclosing query.
    pub fn where_(&mut self, column: &str, value: impl Into<Value>) -> StrataResult<&mut Self> {
        self.where_op(column, "=", value)
    }

    /// `WHERE column op value` on the enclosing query.
    pub fn where_op(
        &mut self,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::compare(column, Operator::parse(operator)?, value.into())?;
        Ok(self.and_where(predicate))
    }

    /// `OR column = value` on the enclosing query.
    pub fn or_where(&mut self, column: &str, value: impl Into<Value>) -> StrataResult<&mut Self> {
        self.or_where_op(column, "=", value)
    }

    /// `OR column op value` on the enclosing query.
    pub fn or_where_op(
        &mut self,
        column: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::compare(column, Operator::parse(operator)?, value.into())?;
        self.or_where_predicate(predicate)
    }

    /// `column BETWEEN low AND high`.
    pub fn where_between(
        &mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::between(column, false, low.into(), high.into())?;
        Ok(self.and_where(predicate))
    }

    /// `OR column BETWEEN low AND high`.
    pub fn or_where_between(
        &mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::between(column, false, low.into(), high.into())?;
        self.or_where_predicate(predicate)
    }

    /// `column NOT BETWEEN low AND high`.
    pub fn where_not_between(
        &mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::between(column, true, low.into(), high.into())?;
        Ok(self.and_where(predicate))
    }

    /// `OR column NOT BETWEEN low AND high`.
    pub fn or_where_not_between(
        &mut self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::between(column, true, low.into(), high.into())?;
        self.or_where_predicate(predicate)
    }

    /// `column IN (...)`.
    pub fn where_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::in_list(column, false, values.into_iter().map(Into::into).collect())?;
        Ok(self.and_where(predicate))
    }

    /// `OR column IN (...)`.
    pub fn or_where_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::in_list(column, false, values.into_iter().map(Into::into).collect())?;
        self.or_where_predicate(predicate)
    }

    /// `column NOT IN (...)`.
    pub fn where_not_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::in_list(column, true, values.into_iter().map(Into::into).collect())?;
        Ok(self.and_where(predicate))
    }

    /// `OR column NOT IN (...)`.
    pub fn or_where_not_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<&mut Self> {
        let predicate = Predicate::in_list(column, true, values.into_iter().map(Into::into).collect())?;
        self.or_where_predicate(predicate)
    }

    /// `column IS NULL`.
    pub fn where_null(&mut self, column: &str) -> StrataResult<&mut Self> {
        let predicate = Predicate::null(column, false)?;
        Ok(self.and_where(predicate))
    }

    /// `OR column IS NULL`.
    pub fn or_where_null(&mut self, column: &str) -> StrataResult<&mut Self> {
        let predicate = Predicate::null(column, false)?;
        self.or_where_predicate(predicate)
    }

    /// `column IS NOT NULL`.
    pub fn where_not_null(&mut self, column: &str) -> StrataResult<&mut Self> {
        let predicate = Predicate::null(column, true)?;
        Ok(self.and_where(predicate))
    }

    /// `OR column IS NOT NULL`.
    pub fn or_where_not_null(&mut self, column: &str) -> StrataResult<&mut Self> {
        let predicate = Predicate::null(column, true)?;
        self.or_where_predicate(predicate)
    }

    /// Adds a MySQL index hint for the joined table.
    pub fn use_index(&mut self, index: &str) -> StrataResult<&mut Self> {
        let index = index.trim();
        if index.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Index name must be a non-empty string".to_string(),
            ));
        }
        self.clause.index_hints.push(index.to_string());
        Ok(self)
    }

    /// Splits the scope into its join clause and the WHERE conditions to
    /// write through.
    pub fn finish(self) -> (JoinClause, Conditions) {
        (self.clause, self.conditions)
    }
}
