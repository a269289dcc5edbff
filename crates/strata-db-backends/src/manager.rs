//! The process-wide connection manager.
//!
//! [`ConnectionManager`] selects one driver from the configured dialect,
//! opens it on first use and keeps it until [`close`](ConnectionManager::close).
//! It is the [`DbExecutor`] the query builder runs against, and it owns the
//! migrations ledger plus the schema checks used before migrating.
//!
//! The manager is shared by cloning an `Arc<ConnectionManager>`; there is no
//! global instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strata_core::logging::{query_span, QUERY_TARGET};
use strata_core::settings::DatabaseSettings;
use strata_core::{StrataError, StrataResult};
use strata_db::dialect::Dialect;
use strata_db::executor::{DbExecutor, QueryOutput, StatementKind};
use strata_db::query::compiler::CompiledQuery;
use strata_db::value::Value;
use tokio::sync::RwLock;
use tracing::Instrument;

use crate::base::DatabaseBackend;

/// Name of the ledger table recording applied migrations.
pub const MIGRATIONS_TABLE: &str = "migrations";

/// Returns `true` if the driver for `dialect` was compiled in.
pub const fn driver_compiled(dialect: Dialect) -> bool {
    match dialect {
        Dialect::MySql => cfg!(feature = "mysql"),
        Dialect::PostgreSql => cfg!(feature = "postgres"),
        Dialect::Sqlite => cfg!(feature = "sqlite"),
    }
}

#[cfg_attr(
    not(any(feature = "sqlite", feature = "postgres", feature = "mysql")),
    allow(unused_variables)
)]
fn open_backend(
    dialect: Dialect,
    settings: &DatabaseSettings,
) -> StrataResult<Arc<dyn DatabaseBackend>> {
    match dialect {
        #[cfg(feature = "sqlite")]
        Dialect::Sqlite => Ok(Arc::new(crate::sqlite::SqliteBackend::open(
            settings.sqlite.path.clone(),
        )?)),
        #[cfg(feature = "postgres")]
        Dialect::PostgreSql => Ok(Arc::new(
            crate::postgresql::PostgresBackend::from_settings(&settings.postgresql)?,
        )),
        #[cfg(feature = "mysql")]
        Dialect::MySql => Ok(Arc::new(crate::mysql::MySqlBackend::from_settings(
            &settings.mysql,
        )?)),
        #[allow(unreachable_patterns)]
        other => Err(StrataError::UnsupportedDialect(format!(
            "{other} (driver not compiled in)"
        ))),
    }
}

/// Lazily connected database handle for one dialect.
pub struct ConnectionManager {
    dialect: Dialect,
    settings: DatabaseSettings,
    backend: RwLock<Option<Arc<dyn DatabaseBackend>>>,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("dialect", &self.dialect)
            .field("query_trace", &self.settings.query_trace)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager for the configured dialect.
    ///
    /// # Errors
    ///
    /// Fails with [`StrataError::UnsupportedDialect`] when the dialect name is
    /// unknown or its driver feature is disabled. No connection is opened.
    pub fn from_settings(settings: &DatabaseSettings) -> StrataResult<Self> {
        let dialect: Dialect = settings.dialect.parse()?;
        if !driver_compiled(dialect) {
            return Err(StrataError::UnsupportedDialect(format!(
                "{dialect} (driver not compiled in)"
            )));
        }
        Ok(Self {
            dialect,
            settings: settings.clone(),
            backend: RwLock::new(None),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Wraps an already opened backend. The dialect comes from the backend;
    /// `settings` supplies the trace switch and database names, and is used
    /// to reconnect after [`close`](Self::close).
    pub fn with_backend(settings: &DatabaseSettings, backend: Arc<dyn DatabaseBackend>) -> Self {
        Self {
            dialect: backend.dialect(),
            settings: settings.clone(),
            backend: RwLock::new(Some(backend)),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// The dialect of the selected driver.
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The settings this manager was built from.
    pub const fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Whether a driver is currently open.
    pub async fn is_connected(&self) -> bool {
        self.backend.read().await.is_some()
    }

    /// Name of the configured database / schema, `None` for SQLite.
    pub fn database_name(&self) -> Option<&str> {
        match self.dialect {
            Dialect::MySql => Some(&self.settings.mysql.database),
            Dialect::PostgreSql => Some(&self.settings.postgresql.database),
            Dialect::Sqlite => None,
        }
    }

    /// Returns the open driver, opening it first if needed.
    pub async fn backend(&self) -> StrataResult<Arc<dyn DatabaseBackend>> {
        if let Some(backend) = self.backend.read().await.as_ref() {
            return Ok(Arc::clone(backend));
        }

        let mut slot = self.backend.write().await;
        if let Some(backend) = slot.as_ref() {
            return Ok(Arc::clone(backend));
        }
        let backend = open_backend(self.dialect, &self.settings)?;
        tracing::info!(dialect = %self.dialect, "database connection opened");
        *slot = Some(Arc::clone(&backend));
        Ok(backend)
    }

    async fn dispatch(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput> {
        let kind = StatementKind::classify(sql);
        let span = query_span(self.dialect.name(), kind.label());
        async {
            if self.settings.query_trace {
                tracing::info!(target: QUERY_TARGET, "Query Trace: {}", self.query_trace(sql, params));
            }
            let backend = self.backend().await?;
            backend.query(sql, params).await
        }
        .instrument(span)
        .await
    }

    /// Runs SQL written with `?` placeholders.
    ///
    /// PostgreSQL placeholders are rewritten to `$n` here, once. The result
    /// is normalized by statement kind: INSERT gives the new id,
    /// UPDATE / DELETE whether rows changed, DDL completion, SELECT rows.
    pub async fn run_query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput> {
        let lowered = self.dialect.lower_placeholders(sql);
        self.dispatch(&lowered, params).await
    }

    /// Runs SQL and discards its result.
    pub async fn run_query_no_return(&self, sql: &str, params: &[Value]) -> StrataResult<()> {
        self.run_query(sql, params).await.map(drop)
    }

    /// Applies or reverts one migration against the ledger.
    ///
    /// Applying checks the ledger for `name`; when absent `query` runs and
    /// `name` is recorded. Returns whether the migration was newly applied.
    ///
    /// Reverting deletes the ledger row and then runs `query`
    /// unconditionally. Returns whether a ledger row was removed.
    pub async fn make_migration(&self, query: &str, name: &str, rollback: bool) -> StrataResult<bool> {
        let name_param = [Value::from(name)];

        if rollback {
            let removed = self
                .run_query("DELETE FROM migrations WHERE migration_name = ?", &name_param)
                .await?
                .as_bool();
            self.run_query(query, &[]).await?;
            tracing::info!(migration = name, "Migration \"{name}\" rolled back.");
            return Ok(removed);
        }

        let applied = self
            .run_query("SELECT * FROM migrations WHERE migration_name = ?", &name_param)
            .await?
            .into_rows();
        if !applied.is_empty() {
            tracing::debug!(migration = name, "migration already applied");
            return Ok(false);
        }

        if !self.run_query(query, &[]).await?.as_bool() {
            tracing::warn!(migration = name, "Migration \"{name}\" failed to execute.");
            return Ok(false);
        }

        let recorded = self
            .run_query("INSERT INTO migrations (migration_name) VALUES (?)", &name_param)
            .await?;
        if recorded.insert_id().is_none() {
            tracing::warn!(migration = name, "Migration \"{name}\" was not applied due to an error.");
            return Ok(false);
        }
        tracing::info!(migration = name, "Migration \"{name}\" applied successfully.");
        Ok(true)
    }

    /// Quotes `value` as a literal of the active dialect. For traces only.
    pub fn escape(&self, value: &Value) -> String {
        self.dialect.escape(value)
    }

    /// Renders already-lowered `sql` with `params` substituted, for logs.
    pub fn query_trace(&self, sql: &str, params: &[Value]) -> String {
        self.dialect.interpolate(sql, params)
    }

    /// Closes the driver. The next query reconnects.
    pub async fn close(&self) -> StrataResult<()> {
        let backend = self.backend.write().await.take();
        if let Some(backend) = backend {
            backend.close().await?;
            tracing::info!(dialect = %self.dialect, "database connection closed");
        }
        Ok(())
    }

    /// Returns the configured database name when it does not exist on the
    /// server. SQLite always reports `None`.
    pub async fn is_schema_not_exist(&self) -> StrataResult<Option<String>> {
        let Some(name) = self.database_name() else {
            return Ok(None);
        };
        if self.backend().await?.schema_exists().await? {
            Ok(None)
        } else {
            Ok(Some(name.to_string()))
        }
    }

    /// Creates the configured database when missing. Returns whether it was
    /// created; SQLite never creates anything.
    pub async fn create_schema(&self) -> StrataResult<bool> {
        if self.dialect == Dialect::Sqlite {
            return Ok(false);
        }
        let backend = self.backend().await?;
        if backend.schema_exists().await? {
            return Ok(false);
        }
        tracing::info!(database = self.database_name().unwrap_or_default(), "Creating schema...");
        backend.create_schema().await
    }

    /// The migrations ledger DDL for the active dialect.
    pub const fn migrations_table_sql(&self) -> &'static str {
        match self.dialect {
            Dialect::MySql => {
                "CREATE TABLE IF NOT EXISTS migrations (\
                 id INT AUTO_INCREMENT PRIMARY KEY, \
                 migration_name VARCHAR(255) NOT NULL UNIQUE, \
                 applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
            }
            Dialect::PostgreSql => {
                "CREATE TABLE IF NOT EXISTS migrations (\
                 id SERIAL PRIMARY KEY, \
                 migration_name VARCHAR(255) NOT NULL UNIQUE, \
                 applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
            }
            Dialect::Sqlite => {
                "CREATE TABLE IF NOT EXISTS migrations (\
                 id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 migration_name VARCHAR(255) NOT NULL UNIQUE, \
                 applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
            }
        }
    }

    /// Creates the migrations ledger if it does not exist.
    pub async fn ensure_migrations_table(&self) -> StrataResult<()> {
        self.run_query_no_return(self.migrations_table_sql(), &[]).await
    }

    /// Names of every user table except the migrations ledger.
    pub async fn user_tables(&self) -> StrataResult<Vec<String>> {
        let output = match self.dialect {
            Dialect::MySql => {
                self.run_query(
                    "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES \
                     WHERE TABLE_SCHEMA = ? AND TABLE_NAME != 'migrations'",
                    &[Value::from(self.settings.mysql.database.as_str())],
                )
                .await?
            }
            Dialect::PostgreSql => {
                self.run_query(
                    "SELECT table_name::text AS name FROM information_schema.tables \
                     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                     AND table_name != 'migrations'",
                    &[],
                )
                .await?
            }
            Dialect::Sqlite => {
                self.run_query(
                    "SELECT name FROM sqlite_master WHERE type = 'table' \
                     AND name NOT LIKE 'sqlite_%' AND name != 'migrations' ORDER BY name",
                    &[],
                )
                .await?
            }
        };
        output
            .into_rows()
            .iter()
            .map(|row| row.get::<String>("name"))
            .collect()
    }

    /// Closes the connection once, however many times it is called.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.close().await {
            Ok(()) => tracing::info!("Database connection closed."),
            Err(e) => tracing::error!(error = %e, "failed to close database connection"),
        }
    }

    /// Spawns a task that waits for SIGINT or SIGTERM and then closes the
    /// connection. The process is left running; exiting is up to the caller.
    pub fn close_on_shutdown(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            manager.shutdown().await;
        })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[async_trait::async_trait]
impl DbExecutor for ConnectionManager {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn run_query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput> {
        Self::run_query(self, sql, params).await
    }

    async fn execute(&self, query: &CompiledQuery) -> StrataResult<QueryOutput> {
        self.dispatch(&query.sql, &query.params).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use super::*;

    /// A server-backed driver double that records statements.
    struct StubServer {
        dialect: Dialect,
        exists: AtomicBool,
        created: AtomicUsize,
        closed: AtomicUsize,
        statements: Mutex<Vec<String>>,
    }

    impl StubServer {
        fn new(dialect: Dialect, exists: bool) -> Arc<Self> {
            Arc::new(Self {
                dialect,
                exists: AtomicBool::new(exists),
                created: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                statements: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl DatabaseBackend for StubServer {
        fn vendor(&self) -> &str {
            "stub"
        }

        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn query(&self, sql: &str, _params: &[Value]) -> StrataResult<QueryOutput> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(QueryOutput::from_counts(StatementKind::classify(sql), 1, Some(Value::Int(1))))
        }

        async fn schema_exists(&self) -> StrataResult<bool> {
            Ok(self.exists.load(Ordering::SeqCst))
        }

        async fn create_schema(&self) -> StrataResult<bool> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.exists.store(true, Ordering::SeqCst);
            Ok(true)
        }

        async fn close(&self) -> StrataResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings_for(dialect: &str) -> DatabaseSettings {
        DatabaseSettings {
            dialect: dialect.to_string(),
            ..DatabaseSettings::default()
        }
    }

    // ── Construction ────────────────────────────────────────────────

    #[test]
    fn test_unknown_dialect_is_fatal() {
        let err = ConnectionManager::from_settings(&settings_for("oracle")).unwrap_err();
        assert!(matches!(err, StrataError::UnsupportedDialect(_)));
    }

    #[test]
    fn test_disabled_driver_is_unsupported() {
        for (name, dialect) in [
            ("mysql", Dialect::MySql),
            ("postgresql", Dialect::PostgreSql),
            ("sqlite", Dialect::Sqlite),
        ] {
            let result = ConnectionManager::from_settings(&settings_for(name));
            assert_eq!(result.is_ok(), driver_compiled(dialect), "{name}");
        }
    }

    #[test]
    fn test_database_name_per_dialect() {
        let backend = StubServer::new(Dialect::MySql, true);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend);
        assert_eq!(manager.database_name(), Some("express"));

        let backend = StubServer::new(Dialect::Sqlite, true);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend);
        assert_eq!(manager.database_name(), None);
    }

    // ── Placeholders and traces ─────────────────────────────────────

    #[tokio::test]
    async fn test_run_query_lowers_for_postgres() {
        let backend = StubServer::new(Dialect::PostgreSql, true);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend.clone());
        manager
            .run_query("SELECT * FROM t WHERE a = ? AND b = ?", &[Value::Int(1), Value::Int(2)])
            .await
            .unwrap();
        assert_eq!(
            backend.statements.lock().unwrap().as_slice(),
            ["SELECT * FROM t WHERE a = $1 AND b = $2"]
        );
    }

    #[tokio::test]
    async fn test_execute_is_not_lowered_again() {
        let backend = StubServer::new(Dialect::PostgreSql, true);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend.clone());
        let compiled = CompiledQuery {
            sql: "SELECT * FROM t WHERE a = $1".to_string(),
            params: vec![Value::Int(1)],
        };
        DbExecutor::execute(&manager, &compiled).await.unwrap();
        assert_eq!(
            backend.statements.lock().unwrap().as_slice(),
            ["SELECT * FROM t WHERE a = $1"]
        );
    }

    #[test]
    fn test_query_trace_and_escape() {
        let backend = StubServer::new(Dialect::MySql, true);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend);
        assert_eq!(
            manager.query_trace("SELECT * FROM t WHERE name = ?", &[Value::from("O'Hara")]),
            "SELECT * FROM t WHERE name = 'O\\'Hara'"
        );
        assert_eq!(manager.escape(&Value::Null), "NULL");
    }

    // ── Schema checks ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_missing_schema_is_reported_and_created() {
        let backend = StubServer::new(Dialect::MySql, false);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend.clone());

        assert_eq!(
            manager.is_schema_not_exist().await.unwrap(),
            Some("express".to_string())
        );
        assert!(manager.create_schema().await.unwrap());
        assert!(!manager.create_schema().await.unwrap());
        assert_eq!(backend.created.load(Ordering::SeqCst), 1);
        assert_eq!(manager.is_schema_not_exist().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_never_creates_schema() {
        let backend = StubServer::new(Dialect::Sqlite, false);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend.clone());
        assert_eq!(manager.is_schema_not_exist().await.unwrap(), None);
        assert!(!manager.create_schema().await.unwrap());
        assert_eq!(backend.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ledger_ddl_per_dialect() {
        let ddl = |d| {
            ConnectionManager::with_backend(&DatabaseSettings::default(), StubServer::new(d, true))
                .migrations_table_sql()
        };
        assert!(ddl(Dialect::MySql).contains("INT AUTO_INCREMENT PRIMARY KEY"));
        assert!(ddl(Dialect::PostgreSql).contains("SERIAL PRIMARY KEY"));
        assert!(ddl(Dialect::Sqlite).contains("INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(ddl(Dialect::Sqlite).contains("migration_name VARCHAR(255) NOT NULL UNIQUE"));
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_shutdown_closes_once() {
        let backend = StubServer::new(Dialect::MySql, true);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend.clone());
        manager.shutdown().await;
        manager.shutdown().await;
        assert_eq!(backend.closed.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let backend = StubServer::new(Dialect::MySql, true);
        let manager = ConnectionManager::with_backend(&DatabaseSettings::default(), backend.clone());
        manager.close().await.unwrap();
        manager.close().await.unwrap();
        assert_eq!(backend.closed.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_lazy_open_and_reconnect() {
        let manager = ConnectionManager::from_settings(&DatabaseSettings::sqlite_memory()).unwrap();
        assert!(!manager.is_connected().await);

        let rows = manager.run_query("SELECT 1 AS one", &[]).await.unwrap().into_rows();
        assert_eq!(rows[0].get::<i64>("one").unwrap(), 1);
        assert!(manager.is_connected().await);

        manager.close().await.unwrap();
        assert!(!manager.is_connected().await);
        manager.run_query_no_return("SELECT 1", &[]).await.unwrap();
        assert!(manager.is_connected().await);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_make_migration_is_idempotent() {
        let manager = ConnectionManager::from_settings(&DatabaseSettings::sqlite_memory()).unwrap();
        manager.ensure_migrations_table().await.unwrap();

        let up = "CREATE TABLE posts (id INTEGER PRIMARY KEY)";
        assert!(manager.make_migration(up, "create_posts", false).await.unwrap());
        assert!(!manager.make_migration(up, "create_posts", false).await.unwrap());
        assert_eq!(manager.user_tables().await.unwrap(), ["posts"]);

        assert!(manager
            .make_migration("DROP TABLE posts", "create_posts", true)
            .await
            .unwrap());
        assert!(manager.user_tables().await.unwrap().is_empty());
    }
}
