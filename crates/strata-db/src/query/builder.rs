//! The fluent query builder.
//!
//! A [`QueryBuilder`] accumulates clauses into a [`QueryState`] and is
//! consumed by exactly one terminal operation (`get`, `first`, `count`,
//! `insert`, `update`, `delete`). Clause methods validate their input before
//! touching the state, so a failed call never leaves a half-added clause.
//!
//! Builders bound to a model (see [`QueryBuilder::for_model`]) hydrate rows
//! into [`ModelInstance`] values and consult the model's
//! [`SoftDeletePolicy`] and [`MassAssignmentGuard`].
//!
//! # Examples
//!
//! ```
//! # use strata_db::executor::{DbExecutor, QueryOutput};
//! # use strata_db::query::CompiledQuery;
//! # use strata_db::{Dialect, Value};
//! # use strata_core::StrataResult;
//! # struct Offline;
//! # #[async_trait::async_trait]
//! # impl DbExecutor for Offline {
//! #     fn dialect(&self) -> Dialect { Dialect::PostgreSql }
//! #     async fn run_query(&self, _: &str, _: &[Value]) -> StrataResult<QueryOutput> { Ok(QueryOutput::Done) }
//! #     async fn execute(&self, _: &CompiledQuery) -> StrataResult<QueryOutput> { Ok(QueryOutput::Done) }
//! # }
//! # let db = Offline;
//! use strata_db::query::QueryBuilder;
//!
//! let query = QueryBuilder::table(&db, "users")?
//!     .select(["id", "name"])
//!     .where_op("age", ">", 18)?
//!     .or_where("role", "admin")?
//!     .order_by("name", "asc")?
//!     .limit(10)?;
//!
//! assert_eq!(
//!     query.to_sql(),
//!     "SELECT id, name FROM users WHERE age > $1 OR role = $2 ORDER BY name ASC LIMIT 10"
//! );
//! # Ok::<(), strata_core::StrataError>(())
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use strata_core::{StrataError, StrataResult};

use super::clause::{Conditions, Operator, Predicate};
use super::compiler::{CompiledQuery, SqlCompiler};
use super::join::{JoinBuilder, JoinClause, JoinType};
use super::state::{Direction, OrderBy, QueryState};
use crate::dialect::Dialect;
use crate::executor::{expect_rows, DbExecutor};
use crate::guard::{MassAssignmentGuard, SoftDeletePolicy};
use crate::model::{Hydrate, ModelInstance, ModelMeta};
use crate::row::{Record, Row};
use crate::value::Value;

/// Which predicate bucket pair a clause goes to.
#[derive(Debug, Clone, Copy)]
enum Section {
    Where,
    Having,
}

impl Section {
    const fn label(self) -> &'static str {
        match self {
            Self::Where => "where",
            Self::Having => "having",
        }
    }
}

/// A chainable query over one table.
///
/// `T` is what read terminals return: [`Row`] for plain table builders,
/// [`ModelInstance`] for model-bound ones.
pub struct QueryBuilder<'a, T = Row> {
    db: &'a dyn DbExecutor,
    state: QueryState,
    model: Option<&'static ModelMeta>,
    _output: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for QueryBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("dialect", &self.db.dialect())
            .field("state", &self.state)
            .field("model", &self.model.map(|m| m.table))
            .finish()
    }
}

impl<'a> QueryBuilder<'a, Row> {
    /// A builder over `table` returning raw rows.
    pub fn table(db: &'a dyn DbExecutor, table: &str) -> StrataResult<Self> {
        Ok(Self {
            db,
            state: QueryState::new(table)?,
            model: None,
            _output: PhantomData,
        })
    }
}

impl<'a> QueryBuilder<'a, ModelInstance> {
    /// A builder over the model's table returning hydrated instances.
    pub fn for_model(db: &'a dyn DbExecutor, meta: &'static ModelMeta) -> StrataResult<Self> {
        Ok(Self {
            db,
            state: QueryState::new(meta.table)?,
            model: Some(meta),
            _output: PhantomData,
        })
    }
}

impl<'a, T: Hydrate> QueryBuilder<'a, T> {
    /// The accumulated state.
    pub const fn state(&self) -> &QueryState {
        &self.state
    }

    /// The dialect statements are compiled for.
    pub fn dialect(&self) -> Dialect {
        self.db.dialect()
    }

    fn compiler(&self) -> SqlCompiler {
        SqlCompiler::new(self.db.dialect())
    }

    fn soft_delete(&self) -> Option<SoftDeletePolicy> {
        self.model.and_then(SoftDeletePolicy::for_model)
    }

    /// The state reads compile from: the soft-delete guard applied to a copy
    /// when the model asks for it.
    fn read_state(&self) -> Cow<'_, QueryState> {
        match self.soft_delete() {
            Some(policy) => {
                let mut state = self.state.clone();
                policy.apply_read_guard(&mut state);
                Cow::Owned(state)
            }
            None => Cow::Borrowed(&self.state),
        }
    }

    fn bucket(&mut self, section: Section) -> &mut Conditions {
        match section {
            Section::Where => &mut self.state.conditions,
            Section::Having => &mut self.state.having,
        }
    }

    fn and_clause(mut self, section: Section, predicate: Predicate) -> Self {
        self.bucket(section).push_and(predicate, 0);
        self
    }

    fn or_clause(mut self, section: Section, predicate: Predicate) -> StrataResult<Self> {
        self.bucket(section)
            .push_or(predicate, 0, section.label())?;
        Ok(self)
    }

    fn compare(column: &str, operator: &str, value: impl Into<Value>) -> StrataResult<Predicate> {
        Predicate::compare(column, Operator::parse(operator)?, value.into())
    }

    fn in_list<V: Into<Value>>(
        column: &str,
        negated: bool,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Predicate> {
        Predicate::in_list(column, negated, values.into_iter().map(Into::into).collect())
    }

    // ── Projection ──────────────────────────────────────────────────

    /// Adds columns to the select list. No columns means `*`.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.fields.extend(columns.into_iter().map(Into::into));
        self
    }

    // ── WHERE ───────────────────────────────────────────────────────

    /// `WHERE column = value`.
    pub fn where_(self, column: &str, value: impl Into<Value>) -> StrataResult<Self> {
        self.where_op(column, "=", value)
    }

    /// `WHERE column op value`.
    pub fn where_op(self, column: &str, operator: &str, value: impl Into<Value>) -> StrataResult<Self> {
        let predicate = Self::compare(column, operator, value)?;
        Ok(self.and_clause(Section::Where, predicate))
    }

    /// `OR column = value`; needs a previous WHERE clause.
    pub fn or_where(self, column: &str, value: impl Into<Value>) -> StrataResult<Self> {
        self.or_where_op(column, "=", value)
    }

    /// `OR column op value`; needs a previous WHERE clause.
    pub fn or_where_op(self, column: &str, operator: &str, value: impl Into<Value>) -> StrataResult<Self> {
        let predicate = Self::compare(column, operator, value)?;
        self.or_clause(Section::Where, predicate)
    }

    /// `WHERE column BETWEEN low AND high`.
    pub fn where_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, false, low.into(), high.into())?;
        Ok(self.and_clause(Section::Where, predicate))
    }

    /// `OR column BETWEEN low AND high`.
    pub fn or_where_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, false, low.into(), high.into())?;
        self.or_clause(Section::Where, predicate)
    }

    /// `WHERE column NOT BETWEEN low AND high`.
    pub fn where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, true, low.into(), high.into())?;
        Ok(self.and_clause(Section::Where, predicate))
    }

    /// `OR column NOT BETWEEN low AND high`.
    pub fn or_where_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, true, low.into(), high.into())?;
        self.or_clause(Section::Where, predicate)
    }

    /// `WHERE column IN (...)`; the list must not be empty.
    pub fn where_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, false, values)?;
        Ok(self.and_clause(Section::Where, predicate))
    }

    /// `OR column IN (...)`.
    pub fn or_where_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, false, values)?;
        self.or_clause(Section::Where, predicate)
    }

    /// `WHERE column NOT IN (...)`.
    pub fn where_not_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, true, values)?;
        Ok(self.and_clause(Section::Where, predicate))
    }

    /// `OR column NOT IN (...)`.
    pub fn or_where_not_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, true, values)?;
        self.or_clause(Section::Where, predicate)
    }

    /// `WHERE column IS NULL`.
    pub fn where_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, false)?;
        Ok(self.and_clause(Section::Where, predicate))
    }

    /// `OR column IS NULL`.
    pub fn or_where_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, false)?;
        self.or_clause(Section::Where, predicate)
    }

    /// `WHERE column IS NOT NULL`.
    pub fn where_not_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, true)?;
        Ok(self.and_clause(Section::Where, predicate))
    }

    /// `OR column IS NOT NULL`.
    pub fn or_where_not_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, true)?;
        self.or_clause(Section::Where, predicate)
    }

    // ── JOIN ────────────────────────────────────────────────────────

    fn add_join(
        mut self,
        join_type: JoinType,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> StrataResult<Self> {
        let mut join = JoinBuilder::new(table, join_type, 0)?;
        join.on_op(first, operator, second)?;
        let (clause, _) = join.finish();
        self.state.joins.push(clause);
        Ok(self)
    }

    fn add_join_with<F>(mut self, join_type: JoinType, table: &str, build: F) -> StrataResult<Self>
    where
        F: FnOnce(&mut JoinBuilder) -> StrataResult<()>,
    {
        let mut join = JoinBuilder::new(table, join_type, self.state.conditions.primary_len())?;
        build(&mut join)?;
        let (clause, conditions): (JoinClause, Conditions) = join.finish();
        self.state.joins.push(clause);
        self.state.conditions.absorb(conditions);
        Ok(self)
    }

    /// `INNER JOIN table ON first = second`.
    ///
    /// `second` is a column when it looks like `table.column` and a quoted
    /// literal otherwise.
    pub fn join(self, table: &str, first: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Inner, table, first, "=", second)
    }

    /// `INNER JOIN table ON first op second`.
    pub fn join_op(self, table: &str, first: &str, operator: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Inner, table, first, operator, second)
    }

    /// `INNER JOIN` configured by a callback.
    ///
    /// WHERE clauses added inside the callback land in this query's WHERE
    /// section, after the clauses it already holds.
    pub fn join_with<F>(self, table: &str, build: F) -> StrataResult<Self>
    where
        F: FnOnce(&mut JoinBuilder) -> StrataResult<()>,
    {
        self.add_join_with(JoinType::Inner, table, build)
    }

    /// `LEFT JOIN table ON first = second`.
    pub fn left_join(self, table: &str, first: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Left, table, first, "=", second)
    }

    /// `LEFT JOIN table ON first op second`.
    pub fn left_join_op(self, table: &str, first: &str, operator: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Left, table, first, operator, second)
    }

    /// `LEFT JOIN` configured by a callback.
    pub fn left_join_with<F>(self, table: &str, build: F) -> StrataResult<Self>
    where
        F: FnOnce(&mut JoinBuilder) -> StrataResult<()>,
    {
        self.add_join_with(JoinType::Left, table, build)
    }

    /// `RIGHT JOIN table ON first = second`.
    pub fn right_join(self, table: &str, first: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Right, table, first, "=", second)
    }

    /// `RIGHT JOIN table ON first op second`.
    pub fn right_join_op(self, table: &str, first: &str, operator: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Right, table, first, operator, second)
    }

    /// `RIGHT JOIN` configured by a callback.
    pub fn right_join_with<F>(self, table: &str, build: F) -> StrataResult<Self>
    where
        F: FnOnce(&mut JoinBuilder) -> StrataResult<()>,
    {
        self.add_join_with(JoinType::Right, table, build)
    }

    /// `FULL JOIN table ON first = second`.
    pub fn full_join(self, table: &str, first: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Full, table, first, "=", second)
    }

    /// `FULL JOIN table ON first op second`.
    pub fn full_join_op(self, table: &str, first: &str, operator: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Full, table, first, operator, second)
    }

    /// `FULL JOIN` configured by a callback.
    pub fn full_join_with<F>(self, table: &str, build: F) -> StrataResult<Self>
    where
        F: FnOnce(&mut JoinBuilder) -> StrataResult<()>,
    {
        self.add_join_with(JoinType::Full, table, build)
    }

    /// `CROSS JOIN table ON first = second`.
    pub fn cross_join(self, table: &str, first: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Cross, table, first, "=", second)
    }

    /// `CROSS JOIN table ON first op second`.
    pub fn cross_join_op(self, table: &str, first: &str, operator: &str, second: &str) -> StrataResult<Self> {
        self.add_join(JoinType::Cross, table, first, operator, second)
    }

    /// `CROSS JOIN` configured by a callback; with no `on` call it renders
    /// a plain cartesian join.
    pub fn cross_join_with<F>(self, table: &str, build: F) -> StrataResult<Self>
    where
        F: FnOnce(&mut JoinBuilder) -> StrataResult<()>,
    {
        self.add_join_with(JoinType::Cross, table, build)
    }

    // ── GROUP BY / HAVING ───────────────────────────────────────────

    /// `GROUP BY columns`; at least one column is required.
    pub fn group_by<I, S>(mut self, columns: I) -> StrataResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(StrataError::InvalidArgument(
                "groupBy requires at least one column".to_string(),
            ));
        }
        if columns.iter().any(|c| c.trim().is_empty()) {
            return Err(StrataError::InvalidArgument(
                "Invalid column name in groupBy".to_string(),
            ));
        }
        self.state.group_by.extend(columns);
        Ok(self)
    }

    /// `HAVING column = value`.
    pub fn having(self, column: &str, value: impl Into<Value>) -> StrataResult<Self> {
        self.having_op(column, "=", value)
    }

    /// `HAVING column op value`.
    pub fn having_op(self, column: &str, operator: &str, value: impl Into<Value>) -> StrataResult<Self> {
        let predicate = Self::compare(column, operator, value)?;
        Ok(self.and_clause(Section::Having, predicate))
    }

    /// `OR column = value` in HAVING; needs a previous HAVING clause.
    pub fn or_having(self, column: &str, value: impl Into<Value>) -> StrataResult<Self> {
        self.or_having_op(column, "=", value)
    }

    /// `OR column op value` in HAVING.
    pub fn or_having_op(self, column: &str, operator: &str, value: impl Into<Value>) -> StrataResult<Self> {
        let predicate = Self::compare(column, operator, value)?;
        self.or_clause(Section::Having, predicate)
    }

    /// `HAVING column BETWEEN low AND high`.
    pub fn having_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, false, low.into(), high.into())?;
        Ok(self.and_clause(Section::Having, predicate))
    }

    /// `OR column BETWEEN low AND high` in HAVING.
    pub fn or_having_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, false, low.into(), high.into())?;
        self.or_clause(Section::Having, predicate)
    }

    /// `HAVING column NOT BETWEEN low AND high`.
    pub fn having_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, true, low.into(), high.into())?;
        Ok(self.and_clause(Section::Having, predicate))
    }

    /// `OR column NOT BETWEEN low AND high` in HAVING.
    pub fn or_having_not_between(
        self,
        column: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> StrataResult<Self> {
        let predicate = Predicate::between(column, true, low.into(), high.into())?;
        self.or_clause(Section::Having, predicate)
    }

    /// `HAVING column IN (...)`.
    pub fn having_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, false, values)?;
        Ok(self.and_clause(Section::Having, predicate))
    }

    /// `OR column IN (...)` in HAVING.
    pub fn or_having_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, false, values)?;
        self.or_clause(Section::Having, predicate)
    }

    /// `HAVING column NOT IN (...)`.
    pub fn having_not_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, true, values)?;
        Ok(self.and_clause(Section::Having, predicate))
    }

    /// `OR column NOT IN (...)` in HAVING.
    pub fn or_having_not_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> StrataResult<Self> {
        let predicate = Self::in_list(column, true, values)?;
        self.or_clause(Section::Having, predicate)
    }

    /// `HAVING column IS NULL`.
    pub fn having_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, false)?;
        Ok(self.and_clause(Section::Having, predicate))
    }

    /// `OR column IS NULL` in HAVING.
    pub fn or_having_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, false)?;
        self.or_clause(Section::Having, predicate)
    }

    /// `HAVING column IS NOT NULL`.
    pub fn having_not_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, true)?;
        Ok(self.and_clause(Section::Having, predicate))
    }

    /// `OR column IS NOT NULL` in HAVING.
    pub fn or_having_not_null(self, column: &str) -> StrataResult<Self> {
        let predicate = Predicate::null(column, true)?;
        self.or_clause(Section::Having, predicate)
    }

    // ── Ordering and paging ─────────────────────────────────────────

    /// `ORDER BY column direction`; `direction` is `asc` or `desc` in any
    /// case.
    pub fn order_by(mut self, column: &str, direction: &str) -> StrataResult<Self> {
        let direction = Direction::parse(direction)?;
        let column = column.trim();
        if column.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Invalid column name for orderBy".to_string(),
            ));
        }
        self.state.order_by.push(OrderBy {
            column: column.to_string(),
            direction,
        });
        Ok(self)
    }

    /// `ORDER BY column DESC`.
    pub fn order_by_desc(self, column: &str) -> StrataResult<Self> {
        self.order_by(column, "desc")
    }

    /// `LIMIT n`; zero is rejected.
    pub fn limit(mut self, n: u64) -> StrataResult<Self> {
        if n == 0 {
            return Err(StrataError::InvalidArgument(
                "Limit must be a positive number".to_string(),
            ));
        }
        self.state.limit = Some(n);
        Ok(self)
    }

    /// `OFFSET n`.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.state.offset = Some(n);
        self
    }

    /// `USE INDEX (...)` on the main table. Rendered for MySQL only.
    pub fn use_index<I, S>(mut self, indexes: I) -> StrataResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let indexes: Vec<String> = indexes.into_iter().map(Into::into).collect();
        if indexes.is_empty() {
            return Err(StrataError::InvalidArgument(
                "useIndex requires at least one index".to_string(),
            ));
        }
        if let Some(bad) = indexes.iter().find(|i| i.trim().is_empty()) {
            return Err(StrataError::InvalidArgument(format!(
                "Invalid index name: '{bad}'"
            )));
        }
        self.state.index_hints.extend(indexes);
        Ok(self)
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// The SELECT this builder would run. Calling it does not change the
    /// builder.
    pub fn to_sql(&self) -> String {
        self.compiler().compile_select(&self.read_state()).sql
    }

    /// The SELECT with its values inlined, for logs and debugging only.
    pub fn to_sql_with_values(&self) -> String {
        let compiled = self.compiler().compile_select(&self.read_state());
        self.dialect().interpolate(&compiled.sql, &compiled.params)
    }

    /// Bound values in placeholder order.
    pub fn bindings(&self) -> Vec<Value> {
        self.read_state().bindings()
    }

    // ── Terminals ───────────────────────────────────────────────────

    fn hydrate_all(&self, rows: Vec<Row>) -> Vec<T> {
        rows.into_iter()
            .map(|row| T::hydrate_row(row, self.model))
            .collect()
    }

    async fn run(&self, query: &CompiledQuery) -> StrataResult<crate::executor::QueryOutput> {
        self.db.execute(query).await
    }

    /// Runs the SELECT and returns every row.
    pub async fn get(self) -> StrataResult<Vec<T>> {
        let query = self.compiler().compile_select(&self.read_state());
        let rows = expect_rows(self.run(&query).await?)?;
        Ok(self.hydrate_all(rows))
    }

    /// Runs the SELECT with `LIMIT 1` and returns the row, if any.
    pub async fn first(mut self) -> StrataResult<Option<T>> {
        self.state.limit = Some(1);
        Ok(self.get().await?.into_iter().next())
    }

    /// Counts matching rows. An empty result counts as zero.
    pub async fn count(self) -> StrataResult<i64> {
        let query = self.compiler().compile_count(&self.read_state());
        self.run(&query).await?.count()
    }

    /// Inserts one record; see [`insert_many`](Self::insert_many).
    pub async fn insert(self, data: Record, validate: bool) -> StrataResult<Value> {
        self.insert_many(vec![data], validate).await
    }

    /// Inserts records and returns the generated id (or `Null`).
    ///
    /// The builder must carry no clauses. With `validate` set and a model
    /// bound, every record passes the mass-assignment guard first.
    pub async fn insert_many(self, data: Vec<Record>, validate: bool) -> StrataResult<Value> {
        if self.state.has_clauses() {
            return Err(StrataError::InvalidState(
                "Insert query cannot have conditions, joins, or other clauses.".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(StrataError::InvalidArgument(
                "Invalid data type for insert: no records given".to_string(),
            ));
        }
        if let (true, Some(meta)) = (validate, self.model) {
            MassAssignmentGuard::new(meta).validate(&data)?;
        }
        let query = self.compiler().compile_insert(&self.state.table, &data)?;
        let output = self.run(&query).await?;
        Ok(output.insert_id().cloned().unwrap_or(Value::Null))
    }

    /// Updates matching rows with `data`; returns whether any row changed.
    ///
    /// Model-bound builders validate `data` against the mass-assignment
    /// guard and never touch soft-deleted rows.
    pub async fn update(self, data: Record) -> StrataResult<bool> {
        if let Some(meta) = self.model {
            MassAssignmentGuard::new(meta).validate(std::slice::from_ref(&data))?;
        }
        let query = self.compiler().compile_update(&self.read_state(), &data)?;
        Ok(self.run(&query).await?.as_bool())
    }

    /// Deletes matching rows; returns whether any row was removed.
    ///
    /// On a soft-delete model this becomes an update of `deleted_at` to the
    /// current time and no DELETE is issued.
    pub async fn delete(self) -> StrataResult<bool> {
        if let Some(policy) = self.soft_delete() {
            tracing::debug!(table = %self.state.table, "soft delete rewritten as update");
            let payload = policy.deletion_payload(chrono::Local::now().naive_local());
            return self.update(payload).await;
        }
        let query = self.compiler().compile_delete(&self.state)?;
        Ok(self.run(&query).await?.as_bool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::QueryOutput;
    use crate::model::Model;
    use crate::testing::RecordingExecutor;

    struct Post;

    impl Model for Post {
        fn meta() -> &'static ModelMeta {
            static META: ModelMeta = ModelMeta::new("posts")
                .fillable(&["title", "body"])
                .guarded(&["id"]);
            &META
        }
    }

    struct Comment;

    impl Model for Comment {
        fn meta() -> &'static ModelMeta {
            static META: ModelMeta = ModelMeta::new("comments")
                .fillable(&["body"])
                .hidden(&["ip"])
                .soft_deletes();
            &META
        }
    }

    fn users(db: &RecordingExecutor) -> QueryBuilder<'_> {
        QueryBuilder::table(db, "users").unwrap()
    }

    // ── Construction ────────────────────────────────────────────────

    #[test]
    fn test_empty_table_rejected() {
        let db = RecordingExecutor::sqlite();
        assert!(matches!(
            QueryBuilder::table(&db, " "),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bare_select() {
        let db = RecordingExecutor::sqlite();
        assert_eq!(users(&db).to_sql(), "SELECT * FROM users");
        assert_eq!(
            users(&db).select(["id", "name"]).to_sql(),
            "SELECT id, name FROM users"
        );
    }

    // ── WHERE ───────────────────────────────────────────────────────

    #[test]
    fn test_where_defaults_to_equality() {
        let db = RecordingExecutor::mysql();
        let q = users(&db).where_("name", "ada").unwrap();
        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE name = ?");
        assert_eq!(q.bindings(), vec![Value::from("ada")]);
    }

    #[test]
    fn test_every_allowed_operator() {
        let db = RecordingExecutor::sqlite();
        for op in ["=", "!=", "<", ">", "<=", ">=", "LIKE", "NOT LIKE"] {
            let sql = users(&db).where_op("age", op, 1).unwrap().to_sql();
            assert!(sql.contains(&format!("age {op} ?")), "{sql}");
        }
    }

    #[test]
    fn test_rejects_unknown_operator() {
        let db = RecordingExecutor::sqlite();
        let err = users(&db).where_op("age", "<>", 1).unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
        let err = users(&db).where_op("age", "; DROP", 1).unwrap_err();
        assert!(matches!(err, StrataError::InvalidArgument(_)));
    }

    #[test]
    fn test_rejects_empty_column() {
        let db = RecordingExecutor::sqlite();
        assert!(matches!(
            users(&db).where_("", 1),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_or_where_without_where_fails() {
        let db = RecordingExecutor::sqlite();
        assert!(matches!(
            users(&db).or_where("a", 1),
            Err(StrataError::InvalidState(_))
        ));
        assert!(matches!(
            users(&db).or_where_null("a"),
            Err(StrataError::InvalidState(_))
        ));
    }

    #[test]
    fn test_where_values_precede_or_values() {
        let db = RecordingExecutor::postgres();
        let q = users(&db)
            .where_("a", 1)
            .unwrap()
            .or_where("b", 2)
            .unwrap()
            .where_("c", 3)
            .unwrap()
            .or_where_in("d", [4, 5])
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM users WHERE a = $1 AND c = $2 OR b = $3 OR d IN ($4, $5)"
        );
        assert_eq!(
            q.bindings(),
            vec![Value::Int(1), Value::Int(3), Value::Int(2), Value::Int(4), Value::Int(5)]
        );
    }

    #[test]
    fn test_where_in_and_between() {
        let db = RecordingExecutor::sqlite();
        let q = users(&db)
            .where_in("id", [1, 2, 3])
            .unwrap()
            .where_not_between("age", 10, 20)
            .unwrap()
            .where_not_null("email")
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM users WHERE id IN (?, ?, ?) AND age NOT BETWEEN ? AND ? AND email IS NOT NULL"
        );
        assert_eq!(q.bindings().len(), 5);
    }

    #[test]
    fn test_where_in_rejects_empty_list() {
        let db = RecordingExecutor::sqlite();
        assert!(matches!(
            users(&db).where_in("x", Vec::<i64>::new()),
            Err(StrataError::InvalidArgument(_))
        ));
        assert!(matches!(
            users(&db).where_not_in("x", Vec::<i64>::new()),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_to_sql_with_values() {
        let db = RecordingExecutor::mysql();
        let q = users(&db)
            .where_("name", "O'Brien")
            .unwrap()
            .where_op("age", ">=", 21)
            .unwrap();
        assert_eq!(
            q.to_sql_with_values(),
            "SELECT * FROM users WHERE name = 'O\\'Brien' AND age >= 21"
        );
        let pg = RecordingExecutor::postgres();
        let q = QueryBuilder::table(&pg, "users")
            .unwrap()
            .where_("name", "O'Brien")
            .unwrap();
        assert_eq!(
            q.to_sql_with_values(),
            "SELECT * FROM users WHERE name = 'O''Brien'"
        );
    }

    // ── JOIN ────────────────────────────────────────────────────────

    #[test]
    fn test_simple_joins() {
        let db = RecordingExecutor::sqlite();
        let q = users(&db)
            .join("posts p", "users.id", "p.user_id")
            .unwrap()
            .left_join_op("roles AS r", "r.level", ">=", "admin")
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM users INNER JOIN posts AS p ON users.id = p.user_id \
             LEFT JOIN roles AS r ON r.level >= 'admin'"
        );
    }

    #[test]
    fn test_join_callback_writes_through_to_where() {
        let db = RecordingExecutor::postgres();
        let q = users(&db)
            .where_("users.active", true)
            .unwrap()
            .join_with("posts", |j| {
                j.on("users.id", "posts.user_id")?
                    .where_("posts.published", true)?
                    .or_where("posts.pinned", true)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM users INNER JOIN posts ON users.id = posts.user_id \
             WHERE users.active = $1 AND posts.published = $2 OR posts.pinned = $3"
        );
        assert_eq!(q.bindings().len(), 3);
    }

    #[test]
    fn test_join_callback_or_negations_number_placeholders() {
        let db = RecordingExecutor::postgres();
        let q = users(&db)
            .where_("users.active", true)
            .unwrap()
            .join_with("posts", |j| {
                j.on("users.id", "posts.user_id")?
                    .where_("posts.published", true)?
                    .or_where_not_between("posts.score", 1, 5)?
                    .or_where_not_in("posts.status", ["draft", "spam"])?;
                Ok(())
            })
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM users INNER JOIN posts ON users.id = posts.user_id \
             WHERE users.active = $1 AND posts.published = $2 \
             OR posts.score NOT BETWEEN $3 AND $4 OR posts.status NOT IN ($5, $6)"
        );
        assert_eq!(
            q.bindings(),
            vec![
                Value::Bool(true),
                Value::Bool(true),
                Value::Int(1),
                Value::Int(5),
                Value::from("draft"),
                Value::from("spam"),
            ]
        );
    }

    #[test]
    fn test_join_callback_error_propagates() {
        let db = RecordingExecutor::sqlite();
        let err = users(&db)
            .join_with("posts", |j| {
                j.or_on("users.id", "posts.user_id")?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidState(_)));
    }

    #[test]
    fn test_join_rejects_blank_table() {
        let db = RecordingExecutor::sqlite();
        assert!(users(&db).join("  ", "a.id", "b.id").is_err());
    }

    // ── GROUP BY / HAVING ───────────────────────────────────────────

    #[test]
    fn test_having_values_follow_where_values() {
        let db = RecordingExecutor::postgres();
        let q = QueryBuilder::table(&db, "orders")
            .unwrap()
            .select(["customer_id", "SUM(total) AS spent"])
            .where_("status", "paid")
            .unwrap()
            .group_by(["customer_id"])
            .unwrap()
            .having_op("SUM(total)", ">", 100)
            .unwrap()
            .or_having_between("COUNT(*)", 5, 9)
            .unwrap()
            .or_where("status", "refunded")
            .unwrap();
        assert_eq!(
            q.to_sql(),
            "SELECT customer_id, SUM(total) AS spent FROM orders WHERE status = $1 \
             OR status = $2 GROUP BY customer_id HAVING SUM(total) > $3 \
             OR COUNT(*) BETWEEN $4 AND $5"
        );
        assert_eq!(
            q.bindings(),
            vec![
                Value::from("paid"),
                Value::from("refunded"),
                Value::Int(100),
                Value::Int(5),
                Value::Int(9)
            ]
        );
    }

    #[test]
    fn test_or_having_requires_having() {
        let db = RecordingExecutor::sqlite();
        let q = users(&db).where_("a", 1).unwrap();
        assert!(matches!(
            q.or_having("b", 2),
            Err(StrataError::InvalidState(ref m)) if m.contains("having")
        ));
    }

    #[test]
    fn test_group_by_requires_columns() {
        let db = RecordingExecutor::sqlite();
        assert!(users(&db).group_by(Vec::<String>::new()).is_err());
    }

    // ── Ordering and paging ─────────────────────────────────────────

    #[test]
    fn test_order_limit_offset() {
        let db = RecordingExecutor::sqlite();
        let q = users(&db)
            .order_by("name", "asc")
            .unwrap()
            .order_by_desc("id")
            .unwrap()
            .limit(5)
            .unwrap()
            .offset(10);
        assert_eq!(
            q.to_sql(),
            "SELECT * FROM users ORDER BY name ASC, id DESC LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_invalid_direction_and_limit() {
        let db = RecordingExecutor::sqlite();
        assert!(users(&db).order_by("name", "up").is_err());
        assert!(matches!(
            users(&db).order_by_desc(""),
            Err(StrataError::InvalidArgument(_))
        ));
        assert!(matches!(
            users(&db).order_by_desc("   "),
            Err(StrataError::InvalidArgument(_))
        ));
        assert!(matches!(
            users(&db).limit(0),
            Err(StrataError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_use_index_is_mysql_only() {
        let my = RecordingExecutor::mysql();
        let sql = users(&my).use_index(["idx_name"]).unwrap().to_sql();
        assert_eq!(sql, "SELECT * FROM users USE INDEX (idx_name)");
        let lite = RecordingExecutor::sqlite();
        assert_eq!(
            users(&lite).use_index(["idx_name"]).unwrap().to_sql(),
            "SELECT * FROM users"
        );
        assert!(users(&lite).use_index(Vec::<String>::new()).is_err());
    }

    // ── Terminals ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_get_returns_rows() {
        let row = Row::from_pairs([("id", Value::Int(1))]);
        let db = RecordingExecutor::sqlite().respond(QueryOutput::Rows(vec![row.clone()]));
        let rows = users(&db).where_("id", 1).unwrap().get().await.unwrap();
        assert_eq!(rows, vec![row]);
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE id = ?");
        assert_eq!(params, vec![Value::Int(1)]);
    }

    #[tokio::test]
    async fn test_first_sets_limit() {
        let db = RecordingExecutor::postgres().respond(QueryOutput::Rows(Vec::new()));
        let found = users(&db).where_("id", 9).unwrap().first().await.unwrap();
        assert!(found.is_none());
        assert_eq!(
            db.last_statement().unwrap().0,
            "SELECT * FROM users WHERE id = $1 LIMIT 1"
        );
    }

    #[tokio::test]
    async fn test_count_on_empty_result_is_zero() {
        let db = RecordingExecutor::sqlite().respond(QueryOutput::Rows(Vec::new()));
        assert_eq!(users(&db).count().await.unwrap(), 0);
        assert_eq!(
            db.last_statement().unwrap().0,
            "SELECT COUNT(*) AS count FROM users"
        );
    }

    #[tokio::test]
    async fn test_count_reads_count_column() {
        let rows = vec![Row::from_pairs([("count", Value::Int(4))])];
        let db = RecordingExecutor::sqlite().respond(QueryOutput::Rows(rows));
        let n = users(&db)
            .where_("active", true)
            .unwrap()
            .order_by_desc("id")
            .unwrap()
            .count()
            .await
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(
            db.last_statement().unwrap().0,
            "SELECT COUNT(*) AS count FROM users WHERE active = ?"
        );
    }

    #[tokio::test]
    async fn test_insert_pads_ragged_records() {
        let db = RecordingExecutor::postgres().respond(QueryOutput::InsertId(Value::Int(7)));
        let id = users(&db)
            .insert_many(
                vec![Record::new().set("a", 1), Record::new().set("b", 2)],
                false,
            )
            .await
            .unwrap();
        assert_eq!(id, Value::Int(7));
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(sql, "INSERT INTO users (a, b) VALUES ($1, $2), ($3, $4)");
        assert_eq!(
            params,
            vec![Value::Int(1), Value::Null, Value::Null, Value::Int(2)]
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_clauses() {
        let db = RecordingExecutor::sqlite();
        let err = users(&db)
            .where_("id", 1)
            .unwrap()
            .insert(Record::new().set("a", 1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidState(_)));
        let err = users(&db)
            .select(["a"])
            .insert(Record::new().set("a", 1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidState(_)));
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_insert_validation_rejects_unfillable() {
        let db = RecordingExecutor::sqlite();
        let err = Post::query(&db)
            .unwrap()
            .insert(Record::new().set("title", "x").set("email", "y"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::NotFillable(ref c) if c == "email"));
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn test_insert_without_validation_skips_guard() {
        let db = RecordingExecutor::sqlite().respond(QueryOutput::InsertId(Value::Int(1)));
        let id = Post::query(&db)
            .unwrap()
            .insert(Record::new().set("id", 5).set("title", "x"), false)
            .await
            .unwrap();
        assert_eq!(id, Value::Int(1));
    }

    #[tokio::test]
    async fn test_update_binds_set_values_first() {
        let db = RecordingExecutor::postgres().respond(QueryOutput::Affected(true));
        let changed = users(&db)
            .where_("id", 3)
            .unwrap()
            .or_where("email", "a@b.c")
            .unwrap()
            .update(Record::new().set("name", "z").set("age", 40))
            .await
            .unwrap();
        assert!(changed);
        let (sql, params) = db.last_statement().unwrap();
        assert_eq!(
            sql,
            "UPDATE users SET name = $1, age = $2 WHERE id = $3 OR email = $4"
        );
        assert_eq!(
            params,
            vec![Value::from("z"), Value::Int(40), Value::Int(3), Value::from("a@b.c")]
        );
    }

    #[tokio::test]
    async fn test_model_update_is_guarded() {
        let db = RecordingExecutor::sqlite();
        let err = Post::query(&db)
            .unwrap()
            .where_("id", 1)
            .unwrap()
            .update(Record::new().set("id", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::GuardedField(_)));
    }

    #[tokio::test]
    async fn test_plain_delete() {
        let db = RecordingExecutor::mysql().respond(QueryOutput::Affected(false));
        let removed = Post::query(&db)
            .unwrap()
            .where_("id", 1)
            .unwrap()
            .delete()
            .await
            .unwrap();
        assert!(!removed);
        assert_eq!(db.last_statement().unwrap().0, "DELETE FROM posts WHERE id = ?");
    }

    // ── Soft deletes ────────────────────────────────────────────────

    #[test]
    fn test_to_sql_applies_guard_once() {
        let db = RecordingExecutor::sqlite();
        let q = Comment::query(&db).unwrap().where_("post_id", 2).unwrap();
        let first = q.to_sql();
        assert_eq!(first, q.to_sql());
        assert_eq!(
            first,
            "SELECT * FROM comments WHERE post_id = ? AND deleted_at IS NULL"
        );
        assert_eq!(q.state().conditions.primary_len(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_never_emits_delete() {
        let db = RecordingExecutor::postgres().respond(QueryOutput::Affected(true));
        let removed = Comment::query(&db)
            .unwrap()
            .where_("id", 4)
            .unwrap()
            .delete()
            .await
            .unwrap();
        assert!(removed);
        let (sql, params) = db.last_statement().unwrap();
        assert!(!sql.contains("DELETE"));
        assert_eq!(
            sql,
            "UPDATE comments SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL"
        );
        assert!(matches!(params[0], Value::DateTime(_)));
        assert_eq!(params[1], Value::Int(4));
    }

    #[tokio::test]
    async fn test_soft_delete_count_and_update_are_guarded() {
        let db = RecordingExecutor::sqlite()
            .respond(QueryOutput::Rows(Vec::new()))
            .respond(QueryOutput::Affected(false));
        Comment::query(&db).unwrap().count().await.unwrap();
        Comment::query(&db)
            .unwrap()
            .update(Record::new().set("body", "edited"))
            .await
            .unwrap();
        let statements = db.statements();
        assert_eq!(
            statements[0].0,
            "SELECT COUNT(*) AS count FROM comments WHERE deleted_at IS NULL"
        );
        assert_eq!(
            statements[1].0,
            "UPDATE comments SET body = ? WHERE deleted_at IS NULL"
        );
    }

    #[tokio::test]
    async fn test_model_rows_are_hydrated() {
        let row = Row::from_pairs([
            ("id", Value::Int(1)),
            ("body", Value::from("hi")),
            ("ip", Value::from("10.0.0.1")),
        ]);
        let db = RecordingExecutor::sqlite().respond(QueryOutput::Rows(vec![row]));
        let comments = Comment::query(&db).unwrap().get().await.unwrap();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].is_hidden("ip"));
        assert_eq!(
            comments[0].to_json(),
            serde_json::json!({"id": 1, "body": "hi"})
        );
    }
}
