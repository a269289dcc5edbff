//! Executor double that records statements instead of running them.

use std::collections::VecDeque;
use std::sync::Mutex;

use strata_core::StrataResult;

use crate::dialect::Dialect;
use crate::executor::{DbExecutor, QueryOutput, StatementKind};
use crate::query::compiler::CompiledQuery;
use crate::value::Value;

/// Records every statement and answers with queued outputs.
///
/// With the queue empty, each statement gets the neutral output for its kind
/// (no rows, no id, nothing affected).
pub struct RecordingExecutor {
    dialect: Dialect,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    responses: Mutex<VecDeque<QueryOutput>>,
}

impl RecordingExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            statements: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn sqlite() -> Self {
        Self::new(Dialect::Sqlite)
    }

    pub fn postgres() -> Self {
        Self::new(Dialect::PostgreSql)
    }

    pub fn mysql() -> Self {
        Self::new(Dialect::MySql)
    }

    /// Queues the output for the next unanswered statement.
    pub fn respond(self, output: QueryOutput) -> Self {
        self.responses.lock().unwrap().push_back(output);
        self
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn last_statement(&self) -> Option<(String, Vec<Value>)> {
        self.statements.lock().unwrap().last().cloned()
    }

    fn record(&self, sql: String, params: &[Value]) -> QueryOutput {
        let kind = StatementKind::classify(&sql);
        self.statements.lock().unwrap().push((sql, params.to_vec()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| QueryOutput::from_counts(kind, 0, None))
    }
}

#[async_trait::async_trait]
impl DbExecutor for RecordingExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn run_query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput> {
        Ok(self.record(self.dialect.lower_placeholders(sql), params))
    }

    async fn execute(&self, query: &CompiledQuery) -> StrataResult<QueryOutput> {
        Ok(self.record(query.sql.clone(), &query.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_query_lowers_once() {
        let db = RecordingExecutor::postgres();
        db.run_query("SELECT * FROM t WHERE a = ? AND b = '?'", &[Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(
            db.last_statement().unwrap().0,
            "SELECT * FROM t WHERE a = $1 AND b = '?'"
        );
    }

    #[tokio::test]
    async fn test_queued_then_neutral_outputs() {
        let db = RecordingExecutor::sqlite().respond(QueryOutput::Affected(true));
        let first = db.run_query("UPDATE t SET a = 1", &[]).await.unwrap();
        let second = db.run_query("UPDATE t SET a = 1", &[]).await.unwrap();
        assert_eq!(first, QueryOutput::Affected(true));
        assert_eq!(second, QueryOutput::Affected(false));
    }
}
