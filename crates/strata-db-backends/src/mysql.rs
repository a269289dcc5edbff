//! MySQL database backend using `mysql_async`.
//!
//! This module provides the [`MySqlBackend`] which implements the
//! [`DatabaseBackend`](crate::base::DatabaseBackend) trait using `mysql_async`
//! for fully asynchronous MySQL operations with connection pooling. Queries
//! from different tasks may be in flight at once on separate pooled
//! connections.

use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use strata_core::settings::ServerSettings;
use strata_core::{StrataError, StrataResult};
use strata_db::dialect::Dialect;
use strata_db::executor::{QueryOutput, StatementKind};
use strata_db::row::Row;
use strata_db::value::Value;

use crate::base::{connection_error, driver_error, DatabaseBackend};

const VENDOR: &str = "mysql";

/// A MySQL database backend.
pub struct MySqlBackend {
    pool: mysql_async::Pool,
    settings: ServerSettings,
}

impl MySqlBackend {
    /// Creates a backend for `settings`. Connections are opened on demand.
    pub fn from_settings(settings: &ServerSettings) -> StrataResult<Self> {
        let pool = mysql_async::Pool::new(Self::opts(settings, Some(&settings.database))?);
        tracing::debug!(
            host = %settings.host,
            port = settings.port,
            database = %settings.database,
            "configured mysql pool"
        );
        Ok(Self {
            pool,
            settings: settings.clone(),
        })
    }

    fn opts(settings: &ServerSettings, database: Option<&str>) -> StrataResult<mysql_async::OptsBuilder> {
        let mut pool_opts = mysql_async::PoolOpts::default();
        if let Some(limit) = settings.connection_limit {
            let constraints = mysql_async::PoolConstraints::new(0, limit.max(1)).ok_or_else(|| {
                StrataError::ConfigurationError(format!("invalid connection limit: {limit}"))
            })?;
            pool_opts = pool_opts.with_constraints(constraints);
        }

        let init = settings
            .charset
            .as_ref()
            .map(|charset| vec![format!("SET NAMES {charset}")])
            .unwrap_or_default();

        Ok(mysql_async::OptsBuilder::default()
            .ip_or_hostname(settings.host.clone())
            .tcp_port(settings.port)
            .user(Some(settings.user.clone()))
            .pass(Some(settings.password.clone()))
            .db_name(database.map(str::to_string))
            .init(init)
            .pool_opts(pool_opts))
    }

    /// Converts `Value`s to `mysql_async` parameter values.
    fn values_to_params(params: &[Value]) -> Vec<mysql_async::Value> {
        params
            .iter()
            .map(|v| match v {
                Value::Null => mysql_async::Value::NULL,
                Value::Bool(b) => mysql_async::Value::from(*b),
                Value::Int(i) => mysql_async::Value::from(*i),
                Value::Float(f) => mysql_async::Value::from(*f),
                Value::String(s) => mysql_async::Value::from(s.as_str()),
                Value::Bytes(b) => mysql_async::Value::from(b.as_slice()),
                Value::DateTimeTz(dt) => mysql_async::Value::from(
                    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                ),
                Value::Date(_)
                | Value::DateTime(_)
                | Value::Time(_)
                | Value::Uuid(_)
                | Value::Json(_) => mysql_async::Value::from(v.to_string()),
            })
            .collect()
    }

    fn convert_value(value: Option<mysql_async::Value>, column_type: ColumnType) -> Value {
        match value {
            None | Some(mysql_async::Value::NULL) => Value::Null,
            Some(mysql_async::Value::Bytes(b)) => match String::from_utf8(b) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            Some(mysql_async::Value::Int(i)) => Value::Int(i),
            Some(mysql_async::Value::UInt(u)) => {
                i64::try_from(u).map_or_else(|_| Value::String(u.to_string()), Value::Int)
            }
            Some(mysql_async::Value::Float(f)) => Value::Float(f64::from(f)),
            Some(mysql_async::Value::Double(d)) => Value::Float(d),
            Some(mysql_async::Value::Date(y, mo, d, h, mi, s, us)) => {
                let Some(date) = chrono::NaiveDate::from_ymd_opt(
                    i32::from(y),
                    u32::from(mo),
                    u32::from(d),
                ) else {
                    // Zero dates have no chrono counterpart.
                    return Value::Null;
                };
                if column_type == ColumnType::MYSQL_TYPE_DATE {
                    return Value::Date(date);
                }
                date.and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                    .map_or(Value::Null, Value::DateTime)
            }
            Some(mysql_async::Value::Time(negative, days, h, mi, s, us)) => {
                if !negative && days == 0 {
                    chrono::NaiveTime::from_hms_micro_opt(
                        u32::from(h),
                        u32::from(mi),
                        u32::from(s),
                        us,
                    )
                    .map_or(Value::Null, Value::Time)
                } else {
                    let sign = if negative { "-" } else { "" };
                    let hours = u64::from(days) * 24 + u64::from(h);
                    Value::String(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
                }
            }
        }
    }

    /// Converts a `mysql_async::Row` to our generic `Row`.
    fn convert_row(mut mysql_row: mysql_async::Row) -> Row {
        let (columns, types): (Vec<String>, Vec<ColumnType>) = mysql_row
            .columns_ref()
            .iter()
            .map(|c| (c.name_str().to_string(), c.column_type()))
            .unzip();

        let values: Vec<Value> = types
            .iter()
            .enumerate()
            .map(|(i, ty)| Self::convert_value(mysql_row.take(i), *ty))
            .collect();

        Row::new(columns, values)
    }

    async fn conn(pool: &mysql_async::Pool) -> StrataResult<mysql_async::Conn> {
        pool.get_conn()
            .await
            .map_err(|e| connection_error(VENDOR, e))
    }

    /// Runs `f` against a throwaway pool that selects no database.
    async fn with_server_conn<T, F>(&self, sql: &str, params: Vec<mysql_async::Value>, f: F) -> StrataResult<T>
    where
        F: FnOnce(Vec<mysql_async::Row>) -> T + Send,
        T: Send,
    {
        let pool = mysql_async::Pool::new(Self::opts(&self.settings, None)?);
        let result = async {
            let mut conn = Self::conn(&pool).await?;
            let rows: Vec<mysql_async::Row> = conn
                .exec(sql, params)
                .await
                .map_err(|e| driver_error(VENDOR, sql, e))?;
            drop(conn);
            Ok(f(rows))
        }
        .await;
        if let Err(e) = pool.disconnect().await {
            tracing::warn!(error = %e, "failed to disconnect mysql server pool");
        }
        result
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for MySqlBackend {
    fn vendor(&self) -> &str {
        VENDOR
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn query(&self, sql: &str, params: &[Value]) -> StrataResult<QueryOutput> {
        let mut conn = Self::conn(&self.pool).await?;
        let kind = StatementKind::classify(sql);

        // DDL is not always preparable; send it over the text protocol.
        if kind == StatementKind::Ddl && params.is_empty() {
            conn.query_drop(sql)
                .await
                .map_err(|e| driver_error(VENDOR, sql, e))?;
            return Ok(QueryOutput::Done);
        }

        let mysql_params = Self::values_to_params(params);
        match kind {
            StatementKind::Select | StatementKind::Other => {
                let rows: Vec<mysql_async::Row> = conn
                    .exec(sql, mysql_params)
                    .await
                    .map_err(|e| driver_error(VENDOR, sql, e))?;
                if kind == StatementKind::Other && rows.is_empty() {
                    return Ok(QueryOutput::Other(conn.affected_rows()));
                }
                Ok(QueryOutput::Rows(rows.into_iter().map(Self::convert_row).collect()))
            }
            _ => {
                conn.exec_drop(sql, mysql_params)
                    .await
                    .map_err(|e| driver_error(VENDOR, sql, e))?;
                let last_id = conn.last_insert_id().map(|id| {
                    i64::try_from(id).map_or_else(|_| Value::String(id.to_string()), Value::Int)
                });
                Ok(QueryOutput::from_counts(kind, conn.affected_rows(), last_id))
            }
        }
    }

    async fn schema_exists(&self) -> StrataResult<bool> {
        self.with_server_conn(
            "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = ?",
            vec![mysql_async::Value::from(self.settings.database.as_str())],
            |rows| !rows.is_empty(),
        )
        .await
    }

    async fn create_schema(&self) -> StrataResult<bool> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            Dialect::MySql.quote_identifier(&self.settings.database)
        );
        self.with_server_conn(&sql, Vec::new(), |_| ()).await?;
        tracing::info!(database = %self.settings.database, "created mysql schema");
        Ok(true)
    }

    async fn close(&self) -> StrataResult<()> {
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| StrataError::DriverError(format!("mysql disconnect failed: {e}")))?;
        tracing::debug!(database = %self.settings.database, "closed mysql pool");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_to_params_basic() {
        let params = vec![
            Value::Bool(true),
            Value::Int(42),
            Value::Float(1.23),
            Value::String("hello".to_string()),
        ];
        let mysql_params = MySqlBackend::values_to_params(&params);
        assert_eq!(mysql_params.len(), 4);
        assert_eq!(mysql_params[1], mysql_async::Value::Int(42));
    }

    #[test]
    fn test_values_to_params_null() {
        let mysql_params = MySqlBackend::values_to_params(&[Value::Null]);
        assert_eq!(mysql_params[0], mysql_async::Value::NULL);
    }

    #[test]
    fn test_values_to_params_datetime_as_text() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let mysql_params = MySqlBackend::values_to_params(&[Value::DateTime(at)]);
        assert_eq!(
            mysql_params[0],
            mysql_async::Value::Bytes(b"2024-06-15 10:30:00".to_vec())
        );
    }

    #[test]
    fn test_values_to_params_json() {
        let params = vec![Value::Json(serde_json::json!({"key": "val"}))];
        let mysql_params = MySqlBackend::values_to_params(&params);
        assert_eq!(
            mysql_params[0],
            mysql_async::Value::Bytes(br#"{"key":"val"}"#.to_vec())
        );
    }

    #[test]
    fn test_convert_text_and_binary() {
        let text = MySqlBackend::convert_value(
            Some(mysql_async::Value::Bytes(b"Alice".to_vec())),
            ColumnType::MYSQL_TYPE_VAR_STRING,
        );
        let blob = MySqlBackend::convert_value(
            Some(mysql_async::Value::Bytes(vec![0xff, 0xfe])),
            ColumnType::MYSQL_TYPE_BLOB,
        );
        assert_eq!(text, Value::from("Alice"));
        assert_eq!(blob, Value::Bytes(vec![0xff, 0xfe]));
    }

    #[test]
    fn test_convert_date_column() {
        let value = MySqlBackend::convert_value(
            Some(mysql_async::Value::Date(2024, 1, 2, 0, 0, 0, 0)),
            ColumnType::MYSQL_TYPE_DATE,
        );
        assert_eq!(
            value,
            Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
    }

    #[test]
    fn test_convert_datetime_column() {
        let value = MySqlBackend::convert_value(
            Some(mysql_async::Value::Date(2024, 1, 2, 3, 4, 5, 0)),
            ColumnType::MYSQL_TYPE_DATETIME,
        );
        let expected = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(value, Value::DateTime(expected));
    }

    #[test]
    fn test_convert_zero_date_is_null() {
        let value = MySqlBackend::convert_value(
            Some(mysql_async::Value::Date(0, 0, 0, 0, 0, 0, 0)),
            ColumnType::MYSQL_TYPE_DATETIME,
        );
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_convert_long_time_is_text() {
        let value = MySqlBackend::convert_value(
            Some(mysql_async::Value::Time(false, 1, 2, 3, 4, 0)),
            ColumnType::MYSQL_TYPE_TIME,
        );
        assert_eq!(value, Value::from("26:03:04"));
    }

    #[tokio::test]
    async fn test_pool_is_lazy() {
        let settings = ServerSettings {
            connection_limit: Some(4),
            ..ServerSettings::mysql()
        };
        let backend = MySqlBackend::from_settings(&settings).unwrap();
        assert_eq!(backend.vendor(), "mysql");
        assert_eq!(backend.dialect(), Dialect::MySql);
        assert_eq!(backend.escape(&Value::from("it's")), "'it\\'s'");
    }
}
