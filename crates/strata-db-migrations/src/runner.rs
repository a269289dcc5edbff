//! Applying and reverting migrations against the ledger table.
//!
//! A [`Migration`] renders its `up` and `down` DDL from a [`Blueprint`]; the
//! [`MigrationRunner`] executes them through the [`ConnectionManager`],
//! which records each applied name in the `migrations` table so that
//! re-running a set is a no-op.

use std::collections::HashSet;

use strata_core::StrataResult;
use strata_db::{Dialect, Value};
use strata_db_backends::{ConnectionManager, MIGRATIONS_TABLE};

use crate::blueprint::Blueprint;

/// One named schema change.
pub trait Migration: Send + Sync {
    /// Ledger key. Must be unique across the set.
    fn name(&self) -> &str;

    /// DDL that applies the change.
    fn up(&self, schema: &Blueprint) -> StrataResult<String>;

    /// DDL that reverts [`up`](Self::up).
    fn down(&self, schema: &Blueprint) -> StrataResult<String>;
}

/// Runs ordered migration sets through a connection manager.
#[derive(Debug)]
pub struct MigrationRunner<'a> {
    db: &'a ConnectionManager,
    schema: Blueprint,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(db: &'a ConnectionManager) -> Self {
        Self {
            db,
            schema: Blueprint::new(db.dialect()),
        }
    }

    /// The blueprint handed to each migration.
    pub const fn schema(&self) -> &Blueprint {
        &self.schema
    }

    /// Creates the ledger table if missing.
    pub async fn init(&self) -> StrataResult<()> {
        self.db.ensure_migrations_table().await?;
        tracing::debug!(table = MIGRATIONS_TABLE, "migrations table ready");
        Ok(())
    }

    /// Names recorded in the ledger, in the order they were applied.
    pub async fn applied(&self) -> StrataResult<Vec<String>> {
        self.init().await?;
        self.db
            .run_query("SELECT migration_name FROM migrations ORDER BY id", &[])
            .await?
            .into_rows()
            .iter()
            .map(|row| row.get::<String>("migration_name"))
            .collect()
    }

    /// Applies every migration not yet in the ledger, in slice order.
    ///
    /// A migration whose DDL cannot be rendered or executed is logged and
    /// skipped; the rest still run. Returns how many were newly applied.
    pub async fn run(&self, migrations: &[Box<dyn Migration>]) -> StrataResult<usize> {
        self.init().await?;

        let mut applied = 0;
        for migration in migrations {
            let name = migration.name();
            let query = match migration.up(&self.schema) {
                Ok(query) => query,
                Err(e) => {
                    tracing::error!(migration = name, error = %e, "could not build migration");
                    continue;
                }
            };
            match self.db.make_migration(&query, name, false).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(migration = name, error = %e, "migration failed");
                }
            }
        }

        if applied == 0 {
            tracing::info!("Nothing to migrate.");
        } else {
            tracing::info!(count = applied, "Migrated {applied} files successfully.");
        }
        Ok(applied)
    }

    /// Reverts the applied members of `migrations`, last first. Returns how
    /// many ledger rows were removed.
    ///
    /// Unlike [`run`](Self::run), the first failure aborts the rollback.
    pub async fn rollback(&self, migrations: &[Box<dyn Migration>]) -> StrataResult<usize> {
        let applied: HashSet<String> = self.applied().await?.into_iter().collect();

        let mut reverted = 0;
        for migration in migrations.iter().rev() {
            let name = migration.name();
            if !applied.contains(name) {
                continue;
            }
            let query = migration.down(&self.schema)?;
            if self.db.make_migration(&query, name, true).await? {
                reverted += 1;
            }
        }
        tracing::info!(count = reverted, "Rolled back successfully.");
        Ok(reverted)
    }

    /// Rolls everything back, then applies the set again.
    pub async fn refresh(&self, migrations: &[Box<dyn Migration>]) -> StrataResult<usize> {
        self.rollback(migrations).await?;
        self.run(migrations).await
    }

    /// Drops every user table, clears the ledger, then applies the set.
    pub async fn fresh(&self, migrations: &[Box<dyn Migration>]) -> StrataResult<usize> {
        self.init().await?;
        let tables = self.db.user_tables().await?;

        if tables.is_empty() {
            tracing::info!("No tables to drop.");
        } else {
            let dialect = self.db.dialect();
            if dialect == Dialect::Sqlite {
                self.db.run_query_no_return("PRAGMA foreign_keys = OFF", &[]).await?;
            }
            for table in &tables {
                let mut sql = self.schema.drop_if_exists(table)?;
                if dialect == Dialect::PostgreSql {
                    sql.push_str(" CASCADE");
                }
                self.db.run_query_no_return(&sql, &[]).await?;
            }
            if dialect == Dialect::Sqlite {
                self.db.run_query_no_return("PRAGMA foreign_keys = ON", &[]).await?;
            }
            tracing::info!(count = tables.len(), "All tables dropped successfully.");
        }

        self.db
            .run_query_no_return("DELETE FROM migrations", &[])
            .await?;
        self.run(migrations).await
    }

    /// See [`ConnectionManager::is_schema_not_exist`].
    pub async fn is_schema_not_exist(&self) -> StrataResult<Option<String>> {
        self.db.is_schema_not_exist().await
    }

    /// See [`ConnectionManager::create_schema`].
    pub async fn create_schema(&self) -> StrataResult<bool> {
        self.db.create_schema().await
    }

    /// Whether `name` is recorded in the ledger.
    pub async fn is_applied(&self, name: &str) -> StrataResult<bool> {
        self.init().await?;
        let rows = self
            .db
            .run_query(
                "SELECT migration_name FROM migrations WHERE migration_name = ?",
                &[Value::from(name)],
            )
            .await?
            .into_rows();
        Ok(!rows.is_empty())
    }
}
