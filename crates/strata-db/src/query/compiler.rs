//! SQL compiler.
//!
//! [`SqlCompiler`] turns a [`QueryState`] plus a [`Statement`] kind into a
//! [`CompiledQuery`]. Clauses are rendered with `?` placeholders and the
//! dialect's placeholder pass runs once at the very end, so PostgreSQL output
//! carries `$1..$n` in the same order as `params`.

use std::fmt::Write as _;

use strata_core::{StrataError, StrataResult};

use super::state::QueryState;
use crate::dialect::Dialect;
use crate::row::Record;
use crate::value::Value;

/// Largest row count MySQL accepts, used for OFFSET without LIMIT.
const MYSQL_UNBOUNDED_LIMIT: &str = "18446744073709551615";

/// SQL text with its parameters, ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// The statement to produce from a query state.
#[derive(Debug, Clone, Copy)]
pub enum Statement<'a> {
    Select,
    Count,
    Insert(&'a [Record]),
    Update(&'a Record),
    Delete,
}

/// Dialect-aware SQL generator.
#[derive(Debug, Clone, Copy)]
pub struct SqlCompiler {
    dialect: Dialect,
}

impl SqlCompiler {
    /// Creates a compiler for `dialect`.
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The target dialect.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Compiles any statement kind.
    pub fn compile(&self, state: &QueryState, statement: Statement<'_>) -> StrataResult<CompiledQuery> {
        match statement {
            Statement::Select => Ok(self.compile_select(state)),
            Statement::Count => Ok(self.compile_count(state)),
            Statement::Insert(rows) => self.compile_insert(&state.table, rows),
            Statement::Update(data) => self.compile_update(state, data),
            Statement::Delete => self.compile_delete(state),
        }
    }

    fn finish(&self, sql: &str, params: Vec<Value>) -> CompiledQuery {
        CompiledQuery {
            sql: self.dialect.lower_placeholders(sql),
            params,
        }
    }

    /// Compiles a SELECT.
    pub fn compile_select(&self, state: &QueryState) -> CompiledQuery {
        let fields = if state.fields.is_empty() {
            "*".to_string()
        } else {
            state.fields.join(", ")
        };
        let mut sql = format!("SELECT {fields} FROM {}", state.table);
        self.push_source(state, &mut sql);
        push_grouping(state, &mut sql);

        // ORDER BY
        if !state.order_by.is_empty() {
            let orders: Vec<String> = state
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                .collect();
            let _ = write!(sql, " ORDER BY {}", orders.join(", "));
        }

        // LIMIT / OFFSET
        match (state.limit, state.offset) {
            (Some(limit), offset) => {
                let _ = write!(sql, " LIMIT {limit}");
                if let Some(offset) = offset {
                    let _ = write!(sql, " OFFSET {offset}");
                }
            }
            (None, Some(offset)) => match self.dialect {
                Dialect::MySql => {
                    let _ = write!(sql, " LIMIT {MYSQL_UNBOUNDED_LIMIT} OFFSET {offset}");
                }
                Dialect::Sqlite => {
                    let _ = write!(sql, " LIMIT -1 OFFSET {offset}");
                }
                Dialect::PostgreSql => {
                    let _ = write!(sql, " OFFSET {offset}");
                }
            },
            (None, None) => {}
        }

        self.finish(&sql, state.bindings())
    }

    /// Compiles `SELECT COUNT(*) AS count` over the same source, filters and
    /// grouping. Ordering and paging are left out.
    pub fn compile_count(&self, state: &QueryState) -> CompiledQuery {
        let mut sql = format!("SELECT COUNT(*) AS count FROM {}", state.table);
        self.push_source(state, &mut sql);
        push_grouping(state, &mut sql);
        self.finish(&sql, state.bindings())
    }

    /// Compiles a multi-row INSERT.
    ///
    /// The column list is the union of every record's keys in first-seen
    /// order; a record lacking a column binds NULL for it.
    pub fn compile_insert(&self, table: &str, rows: &[Record]) -> StrataResult<CompiledQuery> {
        if rows.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Invalid data type for insert: no rows given".to_string(),
            ));
        }
        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(&key) {
                    columns.push(key);
                }
            }
        }
        if columns.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Invalid data type for insert: rows have no columns".to_string(),
            ));
        }

        let group = format!("({})", vec!["?"; columns.len()].join(", "));
        let mut params = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            for column in &columns {
                let value = row.get(column).flatten().cloned().unwrap_or(Value::Null);
                params.push(value);
            }
        }
        let groups = vec![group.as_str(); rows.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES {groups}",
            columns.join(", ")
        );
        Ok(self.finish(&sql, params))
    }

    /// Compiles an UPDATE over the WHERE / OR-WHERE sections.
    ///
    /// Parameters are the SET values followed by the filter values.
    pub fn compile_update(&self, state: &QueryState, data: &Record) -> StrataResult<CompiledQuery> {
        if data.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Invalid data type for update: no columns given".to_string(),
            ));
        }
        self.check_mutation_joins(state, "UPDATE")?;

        let mut params: Vec<Value> = Vec::with_capacity(data.len());
        let assignments: Vec<String> = data
            .iter()
            .map(|(column, value)| {
                params.push(value.cloned().unwrap_or(Value::Null));
                format!("{column} = ?")
            })
            .collect();

        let mut sql = format!("UPDATE {}", state.table);
        if self.dialect == Dialect::MySql && !state.index_hints.is_empty() {
            let _ = write!(sql, " USE INDEX ({})", state.index_hints.join(", "));
        }
        for join in &state.joins {
            join.render(self.dialect, &mut sql);
        }
        let _ = write!(sql, " SET {}", assignments.join(", "));
        state.conditions.render("WHERE", &mut sql);
        state.conditions.collect_values(&mut params);

        Ok(self.finish(&sql, params))
    }

    /// Compiles a DELETE over the WHERE / OR-WHERE sections.
    pub fn compile_delete(&self, state: &QueryState) -> StrataResult<CompiledQuery> {
        self.check_mutation_joins(state, "DELETE")?;
        let mut sql = if state.joins.is_empty() {
            format!("DELETE FROM {}", state.table)
        } else {
            let target = state.table.split_whitespace().last().unwrap_or(state.table.as_str());
            format!("DELETE {target} FROM {}", state.table)
        };
        for join in &state.joins {
            join.render(self.dialect, &mut sql);
        }
        state.conditions.render("WHERE", &mut sql);
        Ok(self.finish(&sql, state.conditions.values()))
    }

    /// Index hint, joins and WHERE section shared by SELECT and COUNT.
    fn push_source(&self, state: &QueryState, sql: &mut String) {
        if self.dialect == Dialect::MySql && !state.index_hints.is_empty() {
            let _ = write!(sql, " USE INDEX ({})", state.index_hints.join(", "));
        }
        for join in &state.joins {
            join.render(self.dialect, sql);
        }
        state.conditions.render("WHERE", sql);
    }

    fn check_mutation_joins(&self, state: &QueryState, verb: &str) -> StrataResult<()> {
        if state.joins.is_empty() || self.dialect == Dialect::MySql {
            return Ok(());
        }
        Err(StrataError::InvalidState(format!(
            "{verb} with joins is only supported on MySQL, not {}",
            self.dialect
        )))
    }
}

fn push_grouping(state: &QueryState, sql: &mut String) {
    if !state.group_by.is_empty() {
        let _ = write!(sql, " GROUP BY {}", state.group_by.join(", "));
    }
    state.having.render("HAVING", sql);
}
