//! Pooled executor over the sqlx `Any` driver

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::RwLock;
use serde_json::{Number, Value};
use sqlx::any::{Any, AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{AnyPool, Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

use records_common::config::DatabaseConfig;
use records_common::error::{Error, Result};
use records_common::types::Record;

use super::dialect::Dialect;
use super::errors::classify;
use super::executor::{ExecuteResult, SqlExecutor};
use super::value::{Arguments, SqlValue};

/// Pool sizing and statement limits
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,
}

impl PoolSettings {
    #[must_use]
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.pool_size.max(1),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            query_timeout: Duration::from_millis(config.query_timeout_ms),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from_config(&DatabaseConfig::default())
    }
}

/// Executor backed by a connection pool
///
/// Each statement checks a connection out of the pool and returns it on
/// completion. `reconnect` swaps the pool; statements already running keep
/// the pool they started on.
pub struct PoolExecutor {
    dialect: Dialect,
    settings: PoolSettings,
    target: RwLock<(String, AnyPool)>,
}

impl PoolExecutor {
    /// Connect using the database configuration
    ///
    /// # Errors
    /// Returns an error for an unknown or unsupported driver, or when the
    /// first connection cannot be established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let dialect = Dialect::from_driver(&config.driver)?;
        let url = config.connection_url()?;
        Self::connect_url(dialect, &url, PoolSettings::from_config(config)).await
    }

    /// Connect to an explicit URL
    ///
    /// # Errors
    /// Returns an error when the pool cannot be opened.
    pub async fn connect_url(dialect: Dialect, url: &str, settings: PoolSettings) -> Result<Self> {
        let pool = open_pool(dialect, url, &settings).await?;
        info!(dialect = %dialect, pool_size = settings.max_connections, "Database pool ready");
        Ok(Self {
            dialect,
            settings,
            target: RwLock::new((url.to_string(), pool)),
        })
    }

    /// Point the executor at another database
    ///
    /// # Errors
    /// Returns an error when the new pool cannot be opened; the current pool
    /// stays in use.
    pub async fn reconnect(&self, url: &str) -> Result<()> {
        let pool = open_pool(self.dialect, url, &self.settings).await?;
        let (_, previous) = std::mem::replace(&mut *self.target.write(), (url.to_string(), pool));
        info!(dialect = %self.dialect, "Database pool switched");
        tokio::spawn(async move { previous.close().await });
        Ok(())
    }

    /// URL of the current pool
    #[must_use]
    pub fn url(&self) -> String {
        self.target.read().0.clone()
    }

    pub async fn close(&self) {
        self.pool().close().await;
    }

    fn pool(&self) -> AnyPool {
        self.target.read().1.clone()
    }

    async fn timed<T>(
        &self,
        sql: &str,
        future: impl Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        let timeout = self.settings.query_timeout;
        match tokio::time::timeout(timeout, future).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                let error = classify(&error);
                if error.is_integrity_failure() {
                    debug!(dialect = %self.dialect, error = %error, "Statement rejected");
                } else {
                    warn!(dialect = %self.dialect, sql = %sql, error = %error, "Statement failed");
                }
                Err(error)
            }
            Err(_) => {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(dialect = %self.dialect, sql = %sql, timeout_ms = millis, "Statement timed out");
                Err(Error::QueryTimeout(millis))
            }
        }
    }
}

#[async_trait]
impl SqlExecutor for PoolExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_all(&self, sql: &str, args: &Arguments) -> Result<Vec<Record>> {
        debug!(dialect = %self.dialect, arguments = args.len(), "{sql}");
        let pool = self.pool();
        let query = bind_values(sqlx::query(sql), args.values());
        let rows = self.timed(sql, query.fetch_all(&pool)).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, args: &Arguments) -> Result<ExecuteResult> {
        debug!(dialect = %self.dialect, arguments = args.len(), "{sql}");
        let pool = self.pool();
        let query = bind_values(sqlx::query(sql), args.values());
        let result = self.timed(sql, query.execute(&pool)).await?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_id(),
        })
    }
}

async fn open_pool(dialect: Dialect, url: &str, settings: &PoolSettings) -> Result<AnyPool> {
    if dialect == Dialect::SqlServer {
        return Err(Error::ConfigError(
            "No pooled driver is available for sqlsrv".to_string(),
        ));
    }
    sqlx::any::install_default_drivers();

    let mut options = AnyPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout);

    if dialect == Dialect::Sqlite {
        if url.contains(":memory:") || url.contains("mode=memory") {
            // every connection to an in-memory database opens a new, empty one
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        options = options.after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        });
    }

    options
        .connect(url)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to connect ({dialect}): {e}")))
}

fn bind_values<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    values: &[SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(text) => query.bind(text.clone()),
            SqlValue::Bytes(bytes) => query.bind(bytes.clone()),
        };
    }
    query
}

fn decode_row(row: &AnyRow) -> Result<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let value = decode_value(row, column.ordinal()).map_err(|e| {
            Error::DatabaseError(format!("Failed to decode column {}: {e}", column.name()))
        })?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_value(row: &AnyRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    let kind = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };
    let value = match kind.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "SMALLINT" => Value::from(row.try_get::<i16, _>(index)?),
        "INTEGER" => Value::from(row.try_get::<i32, _>(index)?),
        "BIGINT" => Value::from(row.try_get::<i64, _>(index)?),
        "REAL" => float_value(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => float_value(row.try_get::<f64, _>(index)?),
        "BLOB" => Value::String(BASE64.encode(row.try_get::<Vec<u8>, _>(index)?)),
        _ => Value::String(row.try_get::<String, _>(index)?),
    };
    Ok(value)
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
