//! # strata-db
//!
//! Query construction for strata. A [`QueryBuilder`](query::QueryBuilder)
//! collects clauses into a dialect-independent
//! [`QueryState`](query::QueryState); the [`SqlCompiler`](query::SqlCompiler)
//! lowers that state to MySQL, PostgreSQL or SQLite text with parameters in
//! placeholder order; a [`DbExecutor`](executor::DbExecutor) runs it.
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`row`] - Result rows and insert/update records
//! - [`dialect`] - Placeholder style, identifier quoting, literal escaping
//! - [`query`] - Clauses, joins, query state, compiler and builder
//! - [`executor`] - The execution seam and normalized query output
//! - [`model`] - Model metadata, hydration and per-model helpers
//! - [`guard`] - Mass-assignment guard and soft-delete policy

// These clippy lints are intentionally allowed for the query crate:
// - too_many_lines: the compiler's select path renders every section in one place
// - result_large_err: StrataError is the framework error type and is used consistently
// - doc_markdown: SQL keywords in docs are not code identifiers
// - needless_pass_by_value: builder methods take owned values by convention
// - missing_const_for_fn: several accessors may grow non-const bodies
// - option_if_let_else: match reads better for SQL section rendering
#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

pub mod dialect;
pub mod executor;
pub mod guard;
pub mod model;
pub mod query;
pub mod row;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use dialect::Dialect;
pub use executor::{DbExecutor, QueryOutput, StatementKind};
pub use guard::{MassAssignmentGuard, SoftDeletePolicy};
pub use model::{hydrate, Eloquent, Hydrate, Model, ModelInstance, ModelMeta};
pub use query::{CompiledQuery, QueryBuilder, SqlCompiler};
pub use row::{FromValue, Record, Row};
pub use value::Value;
