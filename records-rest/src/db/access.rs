//! Record-level statements over reflected tables

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use records_common::error::{Error, Result};
use records_common::types::Record;

use super::builder::ColumnsBuilder;
use super::dialect::Dialect;
use super::executor::SqlExecutor;
use super::value::{Arguments, ValueConverter};
use crate::condition::{ColumnOperator, Condition, ConditionCompiler};
use crate::ordering::OrderColumn;
use crate::reflection::{ReflectedColumn, ReflectedTable};

/// Generic data access shared by every table
///
/// Each method compiles one statement for the executor's dialect, binds
/// values according to the reflected column types and normalizes the
/// returned rows.
pub struct GenericDb {
    executor: Arc<dyn SqlExecutor>,
    builder: ColumnsBuilder,
    conditions: ConditionCompiler,
    values: ValueConverter,
}

impl GenericDb {
    #[must_use]
    pub fn new(executor: Arc<dyn SqlExecutor>, schema: &str) -> Self {
        let dialect = executor.dialect();
        Self {
            executor,
            builder: ColumnsBuilder::new(dialect, schema),
            conditions: ConditionCompiler::new(dialect),
            values: ValueConverter::new(dialect),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    #[must_use]
    pub fn executor(&self) -> Arc<dyn SqlExecutor> {
        self.executor.clone()
    }

    /// Rows matching `condition`, restricted to `columns`
    ///
    /// # Errors
    /// Returns a storage error from the executor.
    pub async fn select_all(
        &self,
        table: &ReflectedTable,
        columns: &[String],
        condition: &Condition,
        ordering: &[OrderColumn],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Record>> {
        if limit == Some(0) {
            return Ok(vec![]);
        }
        let mut args = Arguments::new(self.dialect());
        let where_clause = self.conditions.where_clause(condition, &mut args);
        let sql = format!(
            "SELECT {} FROM {}{where_clause}{}{}",
            self.select_list(table, columns),
            self.builder.table_name(table.name()),
            self.builder.order_by(ordering),
            self.builder
                .offset_limit(!ordering.is_empty(), offset, limit)
        );
        let rows = self.executor.fetch_all(&sql, &args).await?;
        Ok(self.records(table, columns, rows))
    }

    /// Number of rows matching `condition`
    ///
    /// # Errors
    /// Returns a storage error from the executor.
    pub async fn select_count(&self, table: &ReflectedTable, condition: &Condition) -> Result<i64> {
        let mut args = Arguments::new(self.dialect());
        let where_clause = self.conditions.where_clause(condition, &mut args);
        let sql = format!(
            "SELECT COUNT(*) AS {} FROM {}{where_clause}",
            self.dialect().quote("count"),
            self.builder.table_name(table.name())
        );
        let rows = self.executor.fetch_all(&sql, &args).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|value| match value {
                Value::Number(n) => n.as_i64(),
                Value::String(text) => text.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(0);
        Ok(count)
    }

    /// The row with primary key `id`, if it matches `condition`
    ///
    /// An id that does not fit the key type matches no row.
    ///
    /// # Errors
    /// Returns `OperationNotSupported` for tables without a primary key, or a
    /// storage error from the executor.
    pub async fn select_single(
        &self,
        table: &ReflectedTable,
        columns: &[String],
        id: &str,
        condition: &Condition,
    ) -> Result<Option<Record>> {
        let pk = primary_key(table)?;
        let condition = Condition::equals(pk, id).and(condition.clone());
        let rows = self
            .select_all(table, columns, &condition, &[], 0, None)
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Rows whose primary key is one of `ids`
    ///
    /// # Errors
    /// Returns `OperationNotSupported` for tables without a primary key, or a
    /// storage error from the executor.
    pub async fn select_multiple(
        &self,
        table: &ReflectedTable,
        columns: &[String],
        ids: &[String],
        condition: &Condition,
    ) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let pk = primary_key(table)?;
        let condition =
            Condition::column(pk, ColumnOperator::In, ids.join(",")).and(condition.clone());
        self.select_all(table, columns, &condition, &[], 0, None)
            .await
    }

    /// Insert one row and return its primary key value
    ///
    /// # Errors
    /// Returns `InvalidInput` for values that do not fit their column, or a
    /// storage error from the executor.
    pub async fn create_single(&self, table: &ReflectedTable, record: &Record) -> Result<Value> {
        let dialect = self.dialect();
        let mut args = Arguments::new(dialect);
        let (columns, values) = self.builder.insert(table, record, &mut args)?;
        let table_name = self.builder.table_name(table.name());

        let pk = table.pk();
        let given = pk
            .and_then(|pk| record.get(&pk.name))
            .filter(|value| !value.is_null())
            .cloned();

        let (head, tail) = if columns.is_empty() {
            match dialect {
                Dialect::MySql => (format!("INSERT INTO {table_name} ()"), " VALUES ()".to_string()),
                _ => (format!("INSERT INTO {table_name}"), " DEFAULT VALUES".to_string()),
            }
        } else {
            (
                format!("INSERT INTO {table_name} ({columns})"),
                format!(" VALUES ({values})"),
            )
        };

        let generated = match (pk, &given, dialect) {
            (Some(pk), None, Dialect::Postgres | Dialect::Sqlite) => {
                let sql = format!("{head}{tail} RETURNING {}", self.values.select_expression(pk));
                Some(self.fetch_key(table, pk, &sql, &args).await?)
            }
            (Some(pk), None, Dialect::SqlServer) => {
                let sql = format!("{head} OUTPUT INSERTED.{}{tail}", dialect.quote(&pk.name));
                Some(self.fetch_key(table, pk, &sql, &args).await?)
            }
            _ => None,
        };
        if let Some(key) = generated {
            return Ok(key);
        }

        let result = self.executor.execute(&format!("{head}{tail}"), &args).await?;
        debug!(table = table.name(), rows = result.rows_affected, "Inserted record");
        Ok(match (given, result.last_insert_id) {
            (Some(value), _) => value,
            (None, Some(id)) if pk.is_some() => Value::from(id),
            _ => Value::Null,
        })
    }

    /// Update the row with primary key `id`; returns the affected row count
    ///
    /// # Errors
    /// Returns `OperationNotSupported` for tables without a primary key,
    /// `InvalidInput` for values that do not fit their column, or a storage
    /// error from the executor.
    pub async fn update_single(
        &self,
        table: &ReflectedTable,
        record: &Record,
        id: &str,
        condition: &Condition,
    ) -> Result<u64> {
        let pk = primary_key(table)?;
        let mut args = Arguments::new(self.dialect());
        let assignments = self.builder.update(table, record, &mut args)?;
        if assignments.is_empty() {
            return Ok(0);
        }
        self.modify(table, pk, &assignments, id, condition, args)
            .await
    }

    /// Add the numeric values of `record` to the row with primary key `id`
    ///
    /// # Errors
    /// Returns `OperationNotSupported` for tables without a primary key,
    /// `InvalidInput` for deltas that are not numbers, or a storage error
    /// from the executor.
    pub async fn increment_single(
        &self,
        table: &ReflectedTable,
        record: &Record,
        id: &str,
        condition: &Condition,
    ) -> Result<u64> {
        let pk = primary_key(table)?;
        let mut args = Arguments::new(self.dialect());
        let assignments = self.builder.increment(table, record, &mut args)?;
        if assignments.is_empty() {
            return Ok(0);
        }
        self.modify(table, pk, &assignments, id, condition, args)
            .await
    }

    /// Delete the row with primary key `id`; returns the affected row count
    ///
    /// # Errors
    /// Returns `OperationNotSupported` for tables without a primary key, or a
    /// storage error from the executor.
    pub async fn delete_single(
        &self,
        table: &ReflectedTable,
        id: &str,
        condition: &Condition,
    ) -> Result<u64> {
        let pk = primary_key(table)?;
        let mut args = Arguments::new(self.dialect());
        let condition = Condition::equals(pk, id).and(condition.clone());
        let where_clause = self.conditions.where_clause(&condition, &mut args);
        let sql = format!(
            "DELETE FROM {}{where_clause}",
            self.builder.table_name(table.name())
        );
        Ok(self.executor.execute(&sql, &args).await?.rows_affected)
    }

    async fn modify(
        &self,
        table: &ReflectedTable,
        pk: &ReflectedColumn,
        assignments: &str,
        id: &str,
        condition: &Condition,
        mut args: Arguments,
    ) -> Result<u64> {
        let condition = Condition::equals(pk, id).and(condition.clone());
        let where_clause = self.conditions.where_clause(&condition, &mut args);
        let sql = format!(
            "UPDATE {} SET {assignments}{where_clause}",
            self.builder.table_name(table.name())
        );
        Ok(self.executor.execute(&sql, &args).await?.rows_affected)
    }

    async fn fetch_key(
        &self,
        table: &ReflectedTable,
        pk: &ReflectedColumn,
        sql: &str,
        args: &Arguments,
    ) -> Result<Value> {
        let rows = self.executor.fetch_all(sql, args).await?;
        let key = rows
            .into_iter()
            .next()
            .map(|row| self.values.normalize_record(table, row))
            .and_then(|mut row| row.remove(&pk.name))
            .unwrap_or(Value::Null);
        Ok(key)
    }

    fn select_list(&self, table: &ReflectedTable, columns: &[String]) -> String {
        let list = self.builder.select(table, columns);
        if !list.is_empty() {
            return list;
        }
        // no visible column requested; still a valid statement
        table
            .columns()
            .next()
            .map_or_else(|| "1".to_string(), |column| self.dialect().quote(&column.name))
    }

    fn records(&self, table: &ReflectedTable, columns: &[String], rows: Vec<Record>) -> Vec<Record> {
        rows.into_iter()
            .map(|row| {
                let mut record = self.values.normalize_record(table, row);
                record.retain(|name, _| columns.iter().any(|c| c == name));
                record
            })
            .collect()
    }
}

fn primary_key(table: &ReflectedTable) -> Result<&ReflectedColumn> {
    table.pk().ok_or_else(|| {
        Error::OperationNotSupported(format!("Table {} has no single primary key", table.name()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::RecordingExecutor;
    use crate::db::{ExecuteResult, PoolExecutor, PoolSettings, SqlValue};
    use crate::ordering::Direction;
    use crate::reflection::{LogicalType, TableKind};
    use serde_json::json;

    fn sharks() -> ReflectedTable {
        ReflectedTable::new(
            "sharks",
            TableKind::Table,
            vec![
                ReflectedColumn::new("id", LogicalType::Integer).primary_key(),
                ReflectedColumn::new("name", LogicalType::Varchar).with_length(255),
                ReflectedColumn::new("length", LogicalType::Integer),
            ],
        )
    }

    fn all_columns() -> Vec<String> {
        sharks().column_names()
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_select_all_sql() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::Postgres));
        let db = GenericDb::new(executor.clone(), "public");
        let table = sharks();
        let condition = Condition::parse(&table, "length,gt,1000");
        db.select_all(
            &table,
            &all_columns(),
            &condition,
            &[("id".to_string(), Direction::Asc)],
            10,
            Some(5),
        )
        .await
        .unwrap();
        let (sql, values) = executor.last();
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\"::text AS \"name\", \"length\" FROM \"public\".\"sharks\" \
             WHERE \"length\" > CAST($1 AS integer) ORDER BY \"id\" ASC LIMIT 5 OFFSET 10"
        );
        assert_eq!(values, vec![SqlValue::Int(1000)]);
    }

    #[tokio::test]
    async fn test_limit_zero_skips_query() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::Sqlite));
        let db = GenericDb::new(executor.clone(), "");
        let rows = db
            .select_all(&sharks(), &all_columns(), &Condition::None, &[], 0, Some(0))
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(executor.sql().is_empty());
    }

    #[tokio::test]
    async fn test_create_returns_generated_key() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::Postgres));
        executor.push_rows(vec![json!({"id": 9})]);
        let db = GenericDb::new(executor.clone(), "public");
        let key = db
            .create_single(&sharks(), &record(json!({"name": "Nurse"})))
            .await
            .unwrap();
        assert_eq!(key, json!(9));
        assert_eq!(
            executor.last().0,
            "INSERT INTO \"public\".\"sharks\" (\"name\") VALUES ($1) RETURNING \"id\""
        );

        let executor = Arc::new(RecordingExecutor::new(Dialect::MySql));
        executor.push_result(ExecuteResult {
            rows_affected: 1,
            last_insert_id: Some(4),
        });
        let db = GenericDb::new(executor.clone(), "");
        let key = db.create_single(&sharks(), &Record::new()).await.unwrap();
        assert_eq!(key, json!(4));
        assert_eq!(executor.last().0, "INSERT INTO `sharks` () VALUES ()");
    }

    #[tokio::test]
    async fn test_sqlite_insert_returns_key() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::Sqlite));
        executor.push_rows(vec![json!({"id": 4})]);
        let db = GenericDb::new(executor.clone(), "");
        let key = db
            .create_single(&sharks(), &record(json!({"name": "Nurse", "length": 300})))
            .await
            .unwrap();
        assert_eq!(key, json!(4));
        assert_eq!(
            executor.last().0,
            "INSERT INTO \"sharks\" (\"name\", \"length\") VALUES (?, ?) RETURNING \"id\""
        );
    }

    #[tokio::test]
    async fn test_create_keeps_given_key() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::SqlServer));
        let db = GenericDb::new(executor.clone(), "dbo");
        let key = db
            .create_single(&sharks(), &record(json!({"id": 12, "name": "Tiger"})))
            .await
            .unwrap();
        assert_eq!(key, json!(12));
        assert_eq!(
            executor.last().0,
            "INSERT INTO \"dbo\".\"sharks\" (\"id\", \"name\") VALUES (@p1, @p2)"
        );
    }

    #[tokio::test]
    async fn test_sqlsrv_output_clause() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::SqlServer));
        executor.push_rows(vec![json!({"id": 3})]);
        let db = GenericDb::new(executor.clone(), "dbo");
        let key = db
            .create_single(&sharks(), &record(json!({"name": "Mako"})))
            .await
            .unwrap();
        assert_eq!(key, json!(3));
        assert_eq!(
            executor.last().0,
            "INSERT INTO \"dbo\".\"sharks\" (\"name\") OUTPUT INSERTED.\"id\" VALUES (@p1)"
        );
    }

    #[tokio::test]
    async fn test_update_binds_assignments_before_key() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::Postgres));
        executor.push_result(ExecuteResult {
            rows_affected: 1,
            last_insert_id: None,
        });
        let db = GenericDb::new(executor.clone(), "public");
        let affected = db
            .update_single(&sharks(), &record(json!({"length": 420})), "2", &Condition::None)
            .await
            .unwrap();
        assert_eq!(affected, 1);
        let (sql, values) = executor.last();
        assert_eq!(
            sql,
            "UPDATE \"public\".\"sharks\" SET \"length\" = CAST($1 AS integer) \
             WHERE \"id\" = CAST($2 AS integer)"
        );
        assert_eq!(values, vec![SqlValue::Int(420), SqlValue::Int(2)]);
    }

    #[tokio::test]
    async fn test_keyless_table_is_rejected() {
        let executor = Arc::new(RecordingExecutor::new(Dialect::Sqlite));
        let db = GenericDb::new(executor, "");
        let table = ReflectedTable::new(
            "log",
            TableKind::Table,
            vec![ReflectedColumn::new("message", LogicalType::Clob)],
        );
        let error = db
            .delete_single(&table, "1", &Condition::None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::OperationNotSupported(_)));
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let executor = PoolExecutor::connect_url(
            Dialect::Sqlite,
            "sqlite::memory:",
            PoolSettings::default(),
        )
        .await
        .unwrap();
        executor
            .execute(
                "CREATE TABLE sharks (id INTEGER PRIMARY KEY, name VARCHAR(255), length INTEGER)",
                &Arguments::new(Dialect::Sqlite),
            )
            .await
            .unwrap();
        let db = GenericDb::new(Arc::new(executor), "");
        let table = sharks();

        let id = db
            .create_single(&table, &record(json!({"name": "Whale", "length": 1800})))
            .await
            .unwrap();
        assert_eq!(id, json!(1));
        db.increment_single(&table, &record(json!({"length": 20})), "1", &Condition::None)
            .await
            .unwrap();

        let only_name = vec!["name".to_string()];
        let row = db
            .select_single(&table, &only_name, "1", &Condition::None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row, record(json!({"name": "Whale"})));
        let row = db
            .select_single(&table, &all_columns(), "1", &Condition::None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["length"], json!(1820));

        assert_eq!(db.select_count(&table, &Condition::None).await.unwrap(), 1);
        assert_eq!(
            db.delete_single(&table, "1", &Condition::None).await.unwrap(),
            1
        );
        assert!(db
            .select_single(&table, &all_columns(), "1", &Condition::None)
            .await
            .unwrap()
            .is_none());
    }
}
