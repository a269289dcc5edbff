//! Query construction and compilation.
//!
//! - [`clause`] - Operators and WHERE / HAVING predicates
//! - [`join`] - JOIN clauses and the join callback builder
//! - [`state`] - The dialect-independent query state
//! - [`compiler`] - Dialect-aware SQL generation
//! - [`builder`] - The fluent [`QueryBuilder`]

pub mod builder;
pub mod clause;
pub mod compiler;
pub mod join;
pub mod state;

pub use builder::QueryBuilder;
pub use clause::{Conditions, Conjunction, Operator, Predicate};
pub use compiler::{CompiledQuery, SqlCompiler, Statement};
pub use join::{JoinBuilder, JoinClause, JoinType};
pub use state::{Direction, OrderBy, QueryState};
