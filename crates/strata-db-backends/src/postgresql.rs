//! PostgreSQL database backend using `tokio-postgres` and `deadpool-postgres`.
//!
//! This module provides the [`PostgresBackend`] which implements the
//! [`DatabaseBackend`](crate::base::DatabaseBackend) trait on top of a
//! `deadpool-postgres` pool capped at a single connection, so the backend
//! behaves like one logical client.
//!
//! Statements are prepared before execution and every parameter is bound
//! with the Rust type the server expects for its slot. INSERT statements get
//! `RETURNING *` appended; the `id` column of the returned row, when the
//! table has one, is reported as the generated key.

use strata_core::settings::ServerSettings;
use strata_core::{StrataError, StrataResult};
use strata_db::dialect::Dialect;
use strata_db::executor::{QueryOutput, StatementKind};
use strata_db::row::Row;
use strata_db::value::Value;
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, ToSql, Type};

use crate::base::{connection_error, driver_error, DatabaseBackend};

const VENDOR: &str = "postgresql";

/// Database every server carries, used for existence checks and creation.
const MAINTENANCE_DB: &str = "postgres";

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// A PostgreSQL database backend.
pub struct PostgresBackend {
    pool: deadpool_postgres::Pool,
    settings: ServerSettings,
}

impl PostgresBackend {
    /// Creates a backend for `settings`. No connection is made until the
    /// first query.
    pub fn from_settings(settings: &ServerSettings) -> StrataResult<Self> {
        let pool = Self::build_pool(settings, &settings.database)?;
        tracing::debug!(
            host = %settings.host,
            port = settings.port,
            database = %settings.database,
            "configured postgresql pool"
        );
        Ok(Self {
            pool,
            settings: settings.clone(),
        })
    }

    fn build_pool(settings: &ServerSettings, dbname: &str) -> StrataResult<deadpool_postgres::Pool> {
        let mut pg_config = deadpool_postgres::Config::new();
        pg_config.dbname = Some(dbname.to_string());
        pg_config.host = Some(settings.host.clone());
        pg_config.port = Some(settings.port);
        pg_config.user = Some(settings.user.clone());
        pg_config.password = Some(settings.password.clone());
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(1));

        pg_config
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| StrataError::ConfigurationError(format!("Failed to create pool: {e}")))
    }

    /// Appends `RETURNING *` to an INSERT that has no RETURNING clause.
    fn with_returning(sql: &str) -> String {
        if sql.to_ascii_lowercase().contains(" returning ") {
            sql.to_string()
        } else {
            format!("{} RETURNING *", sql.trim_end().trim_end_matches(';'))
        }
    }

    /// The `id` of the first returned row; NULL for tables without one.
    fn inserted_id(rows: &[Row]) -> Value {
        rows.first()
            .and_then(|row| row.get_value("id").cloned())
            .unwrap_or(Value::Null)
    }

    /// A typed NULL for a parameter slot of type `ty`.
    fn null_of(ty: &Type) -> SqlParam {
        match *ty {
            Type::BOOL => Box::new(None::<bool>),
            Type::INT2 => Box::new(None::<i16>),
            Type::INT4 => Box::new(None::<i32>),
            Type::INT8 => Box::new(None::<i64>),
            Type::FLOAT4 => Box::new(None::<f32>),
            Type::FLOAT8 => Box::new(None::<f64>),
            Type::NUMERIC => Box::new(None::<Decimal>),
            Type::BYTEA => Box::new(None::<Vec<u8>>),
            Type::DATE => Box::new(None::<chrono::NaiveDate>),
            Type::TIMESTAMP => Box::new(None::<chrono::NaiveDateTime>),
            Type::TIMESTAMPTZ => Box::new(None::<chrono::DateTime<chrono::Utc>>),
            Type::TIME => Box::new(None::<chrono::NaiveTime>),
            Type::UUID => Box::new(None::<uuid::Uuid>),
            Type::JSON | Type::JSONB => Box::new(None::<serde_json::Value>),
            _ => Box::new(None::<String>),
        }
    }

    fn narrow<T>(v: i64) -> SqlParam
    where
        T: TryFrom<i64> + ToSql + Sync + Send + 'static,
    {
        // Out-of-range values are left wide so the server reports them.
        T::try_from(v).map_or_else(|_| Box::new(v) as SqlParam, |n| Box::new(n) as SqlParam)
    }

    /// Converts a `Value` into a parameter matching the prepared slot type.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn to_sql_param(value: &Value, ty: &Type) -> SqlParam {
        match value {
            Value::Null => Self::null_of(ty),
            Value::Bool(b) => match *ty {
                Type::INT2 | Type::INT4 | Type::INT8 => Self::to_sql_param(&Value::Int(i64::from(*b)), ty),
                _ => Box::new(*b),
            },
            Value::Int(i) => match *ty {
                Type::INT2 => Self::narrow::<i16>(*i),
                Type::INT4 => Self::narrow::<i32>(*i),
                Type::FLOAT4 => Box::new(*i as f32),
                Type::FLOAT8 => Box::new(*i as f64),
                Type::NUMERIC => Box::new(Decimal::from(*i)),
                Type::BOOL => Box::new(*i != 0),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(i.to_string()),
                _ => Box::new(*i),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => Box::new(*f as f32),
                Type::NUMERIC => Decimal::try_from(*f)
                    .map_or_else(|_| Box::new(*f) as SqlParam, |d| Box::new(d) as SqlParam),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(f.to_string()),
                _ => Box::new(*f),
            },
            Value::String(s) => match *ty {
                Type::INT2 | Type::INT4 | Type::INT8 => s
                    .trim()
                    .parse::<i64>()
                    .map_or_else(|_| Box::new(s.clone()) as SqlParam, |i| Self::to_sql_param(&Value::Int(i), ty)),
                Type::NUMERIC => s
                    .trim()
                    .parse::<Decimal>()
                    .map_or_else(|_| Box::new(s.clone()) as SqlParam, |d| Box::new(d) as SqlParam),
                Type::JSON | Type::JSONB => Box::new(
                    serde_json::from_str::<serde_json::Value>(s)
                        .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
                ),
                _ => Box::new(s.clone()),
            },
            Value::Bytes(b) => Box::new(b.clone()),
            Value::Date(d) => match *ty {
                Type::TEXT | Type::VARCHAR => Box::new(d.to_string()),
                _ => Box::new(*d),
            },
            Value::DateTime(dt) => match *ty {
                Type::TIMESTAMPTZ => Box::new(dt.and_utc()),
                Type::TEXT | Type::VARCHAR => Box::new(value.to_string()),
                _ => Box::new(*dt),
            },
            Value::DateTimeTz(dt) => match *ty {
                Type::TIMESTAMP => Box::new(dt.naive_utc()),
                Type::TEXT | Type::VARCHAR => Box::new(dt.to_rfc3339()),
                _ => Box::new(*dt),
            },
            Value::Time(t) => Box::new(*t),
            Value::Uuid(u) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(u.to_string()),
                _ => Box::new(*u),
            },
            Value::Json(j) => match *ty {
                Type::TEXT | Type::VARCHAR => Box::new(j.to_string()),
                _ => Box::new(j.clone()),
            },
        }
    }

    fn bind(params: &[Value], types: &[Type]) -> Vec<SqlParam> {
        params
            .iter()
            .enumerate()
            .map(|(i, v)| Self::to_sql_param(v, types.get(i).unwrap_or(&Type::TEXT)))
            .collect()
    }

    fn undecodable(column: &str, ty: &Type, err: &dyn std::fmt::Display) -> StrataError {
        StrataError::DriverError(format!(
            "{VENDOR}: cannot decode column '{column}' of type {ty}: {err}"
        ))
    }

    /// Reads column `idx` as `T`, mapping SQL NULL to `Value::Null`.
    fn column_value<'a, T, F>(pg_row: &'a tokio_postgres::Row, idx: usize, wrap: F) -> StrataResult<Value>
    where
        T: FromSql<'a>,
        F: FnOnce(T) -> Value,
    {
        pg_row
            .try_get::<_, Option<T>>(idx)
            .map(|v| v.map_or(Value::Null, wrap))
            .map_err(|e| {
                let col = &pg_row.columns()[idx];
                Self::undecodable(col.name(), col.type_(), &e)
            })
    }

    /// NUMERIC keeps its exact digits as text.
    fn numeric_value(d: Decimal) -> Value {
        Value::String(d.to_string())
    }

    /// Converts a `tokio_postgres::Row` to our generic `Row`.
    ///
    /// Types without a native mapping are read as text; a column that cannot
    /// be read as text either fails with `DriverError`.
    fn convert_row(pg_row: &tokio_postgres::Row) -> StrataResult<Row> {
        let mut columns = Vec::with_capacity(pg_row.len());
        let mut values = Vec::with_capacity(pg_row.len());

        for (i, col) in pg_row.columns().iter().enumerate() {
            let value = match *col.type_() {
                Type::BOOL => Self::column_value(pg_row, i, Value::Bool),
                Type::INT2 => Self::column_value(pg_row, i, |v: i16| Value::Int(i64::from(v))),
                Type::INT4 => Self::column_value(pg_row, i, |v: i32| Value::Int(i64::from(v))),
                Type::INT8 => Self::column_value(pg_row, i, Value::Int),
                Type::FLOAT4 => Self::column_value(pg_row, i, |v: f32| Value::Float(f64::from(v))),
                Type::FLOAT8 => Self::column_value(pg_row, i, Value::Float),
                Type::NUMERIC => Self::column_value(pg_row, i, Self::numeric_value),
                Type::BYTEA => Self::column_value(pg_row, i, Value::Bytes),
                Type::UUID => Self::column_value(pg_row, i, Value::Uuid),
                Type::DATE => Self::column_value(pg_row, i, Value::Date),
                Type::TIMESTAMP => Self::column_value(pg_row, i, Value::DateTime),
                Type::TIMESTAMPTZ => Self::column_value(pg_row, i, Value::DateTimeTz),
                Type::TIME => Self::column_value(pg_row, i, Value::Time),
                Type::JSON | Type::JSONB => Self::column_value(pg_row, i, Value::Json),
                _ => Self::column_value(pg_row, i, Value::String),
            }?;
            columns.push(col.name().to_string());
            values.push(value);
        }

        Ok(Row::new(columns, values))
    }

    async fn maintenance_client(
        &self,
    ) -> StrataResult<(deadpool_postgres::Pool, deadpool_postgres::Object)> {
        let pool = Self::build_pool(&self.settings, MAINTENANCE_DB)?;
        let client = pool
            .get()
            .await
            .map_err(|e| connection_error(VENDOR, e))?;
        Ok((pool, client))
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for PostgresBackend {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    async fn query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| connection_error(VENDOR, e))?;

        let kind = StatementKind::classify(sql);
        if kind == StatementKind::Ddl && params.is_empty() {
            client
                .batch_execute(sql)
                .await
                .map_err(|e| driver_error(VENDOR, sql, e))?;
            return Ok(QueryOutput::Done);
        }

        let sql = if kind == StatementKind::Insert {
            Self::with_returning(sql)
        } else {
            sql.to_string()
        };

        let stmt = client
            .prepare(&sql)
            .await
            .map_err(|e| driver_error(VENDOR, &sql, e))?;
        let sql_params = Self::bind(params, stmt.params());
        let param_refs: Vec<&(dyn ToSql + Sync)> = sql_params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        if kind == StatementKind::Insert {
            let rows = client
                .query(&stmt, &param_refs)
                .await
                .map_err(|e| driver_error(VENDOR, &sql, e))?;
            let rows = rows
                .iter()
                .map(Self::convert_row)
                .collect::<StrataResult<Vec<_>>>()?;
            let id = Self::inserted_id(&rows);
            return Ok(QueryOutput::from_counts(kind, rows.len() as u64, Some(id)));
        }

        if kind == StatementKind::Select || !stmt.columns().is_empty() {
            let rows = client
                .query(&stmt, &param_refs)
                .await
                .map_err(|e| driver_error(VENDOR, &sql, e))?;
            let rows = rows
                .iter()
                .map(Self::convert_row)
                .collect::<StrataResult<Vec<_>>>()?;
            return Ok(QueryOutput::Rows(rows));
        }

        let affected = client
            .execute(&stmt, &param_refs)
            .await
            .map_err(|e| driver_error(VENDOR, &sql, e))?;
        Ok(QueryOutput::from_counts(kind, affected, None))
    }

    async fn schema_exists(&self) -> StrataResult<bool> {
        const SQL: &str = "SELECT 1 FROM pg_database WHERE datname = $1";
        let (pool, client) = self.maintenance_client().await?;
        let rows = client
            .query(SQL, &[&self.settings.database])
            .await
            .map_err(|e| driver_error(VENDOR, SQL, e));
        drop(client);
        pool.close();
        Ok(!rows?.is_empty())
    }

    async fn create_schema(&self) -> StrataResult<bool> {
        let sql = format!(
            "CREATE DATABASE {}",
            Dialect::PostgreSql.quote_identifier(&self.settings.database)
        );
        let (pool, client) = self.maintenance_client().await?;
        let result = client
            .batch_execute(&sql)
            .await
            .map_err(|e| driver_error(VENDOR, &sql, e));
        drop(client);
        pool.close();
        result?;
        tracing::info!(database = %self.settings.database, "created postgresql database");
        Ok(true)
    }

    async fn close(&self) -> StrataResult<()> {
        self.pool.close();
        tracing::debug!(database = %self.settings.database, "closed postgresql pool");
        Ok(())
    }
}
