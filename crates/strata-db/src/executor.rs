//! The seam between query construction and the drivers.
//!
//! [`DbExecutor`] is the minimal async interface the builder needs. It lives
//! here so `strata-db` stays free of driver crates; the connection manager in
//! `strata-db-backends` implements it.

use strata_core::{StrataError, StrataResult};

use crate::dialect::Dialect;
use crate::query::compiler::CompiledQuery;
use crate::row::Row;
use crate::value::Value;

/// Statement family, decided by the leading SQL keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// `CREATE`, `ALTER` or `DROP`.
    Ddl,
    /// Anything else (`SHOW`, `PRAGMA`, `SET`, ...).
    Other,
}

impl StatementKind {
    /// Classifies `sql` by its first word, ignoring case and leading
    /// whitespace or parentheses.
    ///
    /// ```
    /// use strata_db::executor::StatementKind;
    ///
    /// assert_eq!(StatementKind::classify("  select 1"), StatementKind::Select);
    /// assert_eq!(StatementKind::classify("DROP TABLE t"), StatementKind::Ddl);
    /// assert_eq!(StatementKind::classify("PRAGMA foreign_keys"), StatementKind::Other);
    /// ```
    pub fn classify(sql: &str) -> Self {
        let verb = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match verb.as_str() {
            "select" | "with" => Self::Select,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "create" | "alter" | "drop" => Self::Ddl,
            _ => Self::Other,
        }
    }

    /// Lowercase label used in logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Ddl => "ddl",
            Self::Other => "other",
        }
    }
}

/// A driver result normalized by statement kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Rows of a SELECT.
    Rows(Vec<Row>),
    /// Identifier generated by an INSERT, `Null` if none was reported.
    InsertId(Value),
    /// Whether an UPDATE or DELETE touched at least one row.
    Affected(bool),
    /// A DDL statement completed.
    Done,
    /// Rows affected by any other statement.
    Other(u64),
}

impl QueryOutput {
    /// Builds the output for a non-row statement from its raw counters.
    pub fn from_counts(kind: StatementKind, affected: u64, last_id: Option<Value>) -> Self {
        match kind {
            StatementKind::Insert => Self::InsertId(last_id.unwrap_or(Value::Null)),
            StatementKind::Update | StatementKind::Delete => Self::Affected(affected > 0),
            StatementKind::Ddl => Self::Done,
            StatementKind::Select => Self::Rows(Vec::new()),
            StatementKind::Other => Self::Other(affected),
        }
    }

    /// Extracts rows; other outputs yield an empty list.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// Boolean view: `Affected(b)`, `Done` as true, non-zero counts.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Affected(b) => *b,
            Self::Done => true,
            Self::Other(n) => *n > 0,
            Self::Rows(rows) => !rows.is_empty(),
            Self::InsertId(id) => !id.is_null(),
        }
    }

    /// The generated id of an INSERT.
    pub fn insert_id(&self) -> Option<&Value> {
        match self {
            Self::InsertId(id) if !id.is_null() => Some(id),
            _ => None,
        }
    }

    /// Reads the `count` column of the first row, defaulting to 0.
    pub fn count(self) -> StrataResult<i64> {
        match self.into_rows().first() {
            Some(row) => row.get::<i64>("count"),
            None => Ok(0),
        }
    }
}

/// Minimal async executor used by the query builder and model helpers.
#[async_trait::async_trait]
pub trait DbExecutor: Send + Sync {
    /// The dialect statements must be compiled for.
    fn dialect(&self) -> Dialect;

    /// Runs raw SQL written with `?` placeholders. The dialect's placeholder
    /// rewrite is applied once before dispatch.
    async fn run_query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput>;

    /// Runs output of the [`SqlCompiler`](crate::query::compiler::SqlCompiler),
    /// whose placeholders are already in final form.
    async fn execute(&self, query: &CompiledQuery) -> StrataResult<QueryOutput>;
}

/// Fails unless `output` carries rows.
pub fn expect_rows(output: QueryOutput) -> StrataResult<Vec<Row>> {
    match output {
        QueryOutput::Rows(rows) => Ok(rows),
        other => Err(StrataError::DriverError(format!(
            "Expected a row set, got {other:?}"
        ))),
    }
}
