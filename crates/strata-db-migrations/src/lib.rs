//! # strata-db-migrations
//!
//! Schema DDL and migration bookkeeping for strata.
//!
//! - [`blueprint`] - `Blueprint`, `CreateTable`, `AlterTable`: dialect-aware
//!   `CREATE TABLE` / `ALTER TABLE` text.
//! - [`runner`] - the `Migration` trait and `MigrationRunner`, which applies,
//!   rolls back, refreshes and rebuilds a set of migrations against the
//!   `migrations` ledger table.

#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

pub mod blueprint;
pub mod runner;

pub use blueprint::{
    AlterTable, Blueprint, ColumnOptions, CreateTable, ForeignKey, ReferentialAction,
};
pub use runner::{Migration, MigrationRunner};
