//! Dialect specific schema introspection queries

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use records_common::error::Result;
use records_common::types::Record;

use super::table::TableKind;
use crate::db::{Arguments, Dialect, SqlExecutor};

/// Column description as reported by the database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub nullable: bool,
    /// Type name, possibly carrying `(length)` or `(precision,scale)`
    pub data_type: String,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    /// Full type declaration where the dialect reports one separately
    pub column_type: String,
}

/// Introspects tables, columns and keys of one schema
pub struct SchemaReflector {
    executor: Arc<dyn SqlExecutor>,
    dialect: Dialect,
    schema: String,
}

impl SchemaReflector {
    /// Reflect `schema`, or the dialect default schema when empty
    #[must_use]
    pub fn new(executor: Arc<dyn SqlExecutor>, schema: &str) -> Self {
        let dialect = executor.dialect();
        let schema = if schema.is_empty() {
            dialect.default_schema().to_string()
        } else {
            schema.to_string()
        };
        Self {
            executor,
            dialect,
            schema,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// System tables never exposed
    #[must_use]
    pub fn ignored_tables(&self) -> &'static [&'static str] {
        match self.dialect {
            Dialect::Postgres => &[
                "spatial_ref_sys",
                "raster_columns",
                "raster_overviews",
                "geography_columns",
                "geometry_columns",
            ],
            Dialect::Sqlite => &[
                "geometry_columns",
                "spatial_ref_sys",
                "spatialite_history",
                "sql_statements_log",
            ],
            Dialect::SqlServer => &["sysdiagrams"],
            Dialect::MySql => &[],
        }
    }

    /// Every table and view of the schema
    ///
    /// # Errors
    /// Returns a database error when the introspection query fails.
    pub async fn list_tables(&self) -> Result<Vec<(String, TableKind)>> {
        let mut args = Arguments::new(self.dialect);
        let sql = match self.dialect {
            Dialect::MySql => "SELECT CAST(TABLE_NAME AS CHAR) AS table_name, CAST(TABLE_TYPE AS CHAR) AS table_type \
                 FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')"
                .to_string(),
            Dialect::Postgres => format!(
                "SELECT table_name::text AS table_name, table_type::text AS table_type \
                 FROM information_schema.tables \
                 WHERE table_schema = {} AND table_type IN ('BASE TABLE', 'VIEW')",
                args.push(self.schema.as_str())
            ),
            Dialect::SqlServer => format!(
                "SELECT o.name AS table_name, CASE o.type WHEN 'V' THEN 'VIEW' ELSE 'BASE TABLE' END AS table_type \
                 FROM sys.objects o \
                 WHERE o.type IN ('U', 'V') AND o.is_ms_shipped = 0 AND SCHEMA_NAME(o.schema_id) = {}",
                args.push(self.schema.as_str())
            ),
            Dialect::Sqlite => "SELECT name AS table_name, CASE type WHEN 'view' THEN 'VIEW' ELSE 'BASE TABLE' END AS table_type \
                 FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'"
                .to_string(),
        };
        let rows = self.executor.fetch_all(&sql, &args).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "table_name")?;
                let kind = TableKind::from_introspection(&text(row, "table_type").unwrap_or_default());
                Some((name, kind))
            })
            .collect())
    }

    /// Columns of a table in declaration order
    ///
    /// # Errors
    /// Returns a database error when the introspection query fails.
    pub async fn list_columns(&self, table: &str, kind: TableKind) -> Result<Vec<RawColumn>> {
        let mut args = Arguments::new(self.dialect);
        let sql = match self.dialect {
            Dialect::MySql => format!(
                "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, CAST(IS_NULLABLE AS CHAR) AS is_nullable, \
                 CAST(DATA_TYPE AS CHAR) AS data_type, CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS character_maximum_length, \
                 CAST(NUMERIC_PRECISION AS SIGNED) AS numeric_precision, CAST(NUMERIC_SCALE AS SIGNED) AS numeric_scale, \
                 CAST(COLUMN_TYPE AS CHAR) AS column_type \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_NAME = {} AND TABLE_SCHEMA = DATABASE() \
                 ORDER BY ORDINAL_POSITION",
                args.push(table)
            ),
            Dialect::Postgres => format!(
                "SELECT column_name::text AS column_name, is_nullable::text AS is_nullable, \
                 CASE WHEN data_type = 'USER-DEFINED' THEN udt_name::text ELSE data_type::text END AS data_type, \
                 character_maximum_length::integer AS character_maximum_length, \
                 numeric_precision::integer AS numeric_precision, numeric_scale::integer AS numeric_scale, \
                 ''::text AS column_type \
                 FROM information_schema.columns \
                 WHERE table_name = {} AND table_schema = {} \
                 ORDER BY ordinal_position",
                args.push(table),
                args.push(self.schema.as_str())
            ),
            Dialect::SqlServer => format!(
                "SELECT c.name AS column_name, CASE WHEN c.is_nullable = 1 THEN 'YES' ELSE 'NO' END AS is_nullable, \
                 t.name AS data_type, \
                 CAST(CASE WHEN t.name IN ('nchar', 'nvarchar') AND c.max_length > 0 THEN c.max_length / 2 ELSE c.max_length END AS INT) AS character_maximum_length, \
                 CAST(c.precision AS INT) AS numeric_precision, CAST(c.scale AS INT) AS numeric_scale, \
                 '' AS column_type \
                 FROM sys.columns c JOIN sys.types t ON c.user_type_id = t.user_type_id \
                 WHERE c.object_id = OBJECT_ID(QUOTENAME({schema}) + '.' + QUOTENAME({table})) \
                 ORDER BY c.column_id",
                table = args.push(table),
                schema = args.push(self.schema.as_str())
            ),
            Dialect::Sqlite => format!(
                "SELECT name AS column_name, CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable, \
                 type AS data_type, NULL AS character_maximum_length, NULL AS numeric_precision, \
                 NULL AS numeric_scale, '' AS column_type \
                 FROM pragma_table_info({}) ORDER BY cid",
                args.push(table)
            ),
        };
        let rows = self.executor.fetch_all(&sql, &args).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let mut column = RawColumn {
                    name: text(row, "column_name")?,
                    nullable: flag(row, "is_nullable"),
                    data_type: text(row, "data_type").unwrap_or_default(),
                    length: number(row, "character_maximum_length"),
                    precision: number(row, "numeric_precision"),
                    scale: number(row, "numeric_scale"),
                    column_type: text(row, "column_type").unwrap_or_default(),
                };
                if kind == TableKind::View && column.data_type.trim().is_empty() {
                    // computed view columns carry no declared type
                    column.data_type = "clob".to_string();
                }
                Some(column)
            })
            .collect())
    }

    /// Primary key column names
    ///
    /// # Errors
    /// Returns a database error when the introspection query fails.
    pub async fn list_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let mut args = Arguments::new(self.dialect);
        let sql = match self.dialect {
            Dialect::MySql => format!(
                "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name \
                 FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
                 WHERE CONSTRAINT_NAME = 'PRIMARY' AND TABLE_NAME = {} AND TABLE_SCHEMA = DATABASE() \
                 ORDER BY ORDINAL_POSITION",
                args.push(table)
            ),
            Dialect::Postgres => format!(
                "SELECT a.attname::text AS column_name \
                 FROM pg_catalog.pg_index i \
                 JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY (i.indkey) \
                 WHERE i.indisprimary AND i.indrelid = (quote_ident({schema}) || '.' || quote_ident({table}))::regclass",
                table = args.push(table),
                schema = args.push(self.schema.as_str())
            ),
            Dialect::SqlServer => format!(
                "SELECT c.name AS column_name \
                 FROM sys.indexes i \
                 JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
                 JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
                 WHERE i.is_primary_key = 1 AND i.object_id = OBJECT_ID(QUOTENAME({schema}) + '.' + QUOTENAME({table}))",
                table = args.push(table),
                schema = args.push(self.schema.as_str())
            ),
            Dialect::Sqlite => format!(
                "SELECT name AS column_name FROM pragma_table_info({}) WHERE pk > 0 ORDER BY pk",
                args.push(table)
            ),
        };
        let rows = self.executor.fetch_all(&sql, &args).await?;
        Ok(rows.iter().filter_map(|row| text(row, "column_name")).collect())
    }

    /// Foreign key columns mapped to the tables they reference
    ///
    /// # Errors
    /// Returns a database error when the introspection query fails.
    pub async fn list_foreign_keys(&self, table: &str) -> Result<BTreeMap<String, String>> {
        let mut args = Arguments::new(self.dialect);
        let sql = match self.dialect {
            Dialect::MySql => format!(
                "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, CAST(REFERENCED_TABLE_NAME AS CHAR) AS referenced_table \
                 FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
                 WHERE REFERENCED_TABLE_NAME IS NOT NULL AND TABLE_NAME = {} AND TABLE_SCHEMA = DATABASE()",
                args.push(table)
            ),
            Dialect::Postgres => format!(
                "SELECT a.attname::text AS column_name, cl.relname::text AS referenced_table \
                 FROM pg_catalog.pg_constraint c \
                 JOIN pg_catalog.pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = ANY (c.conkey) \
                 JOIN pg_catalog.pg_class cl ON cl.oid = c.confrelid \
                 WHERE c.contype = 'f' AND c.conrelid = (quote_ident({schema}) || '.' || quote_ident({table}))::regclass",
                table = args.push(table),
                schema = args.push(self.schema.as_str())
            ),
            Dialect::SqlServer => format!(
                "SELECT COL_NAME(fc.parent_object_id, fc.parent_column_id) AS column_name, \
                 OBJECT_NAME(f.referenced_object_id) AS referenced_table \
                 FROM sys.foreign_keys f \
                 JOIN sys.foreign_key_columns fc ON fc.constraint_object_id = f.object_id \
                 WHERE f.parent_object_id = OBJECT_ID(QUOTENAME({schema}) + '.' + QUOTENAME({table}))",
                table = args.push(table),
                schema = args.push(self.schema.as_str())
            ),
            Dialect::Sqlite => format!(
                "SELECT \"from\" AS column_name, \"table\" AS referenced_table FROM pragma_foreign_key_list({})",
                args.push(table)
            ),
        };
        let rows = self.executor.fetch_all(&sql, &args).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let column = text(row, "column_name")?;
                let target = text(row, "referenced_table")?;
                Some((column, strip_qualifier(&target)))
            })
            .collect())
    }
}

/// Drop a schema prefix and identifier quotes from a table reference
fn strip_qualifier(name: &str) -> String {
    let unqualified = name.rsplit('.').next().unwrap_or(name);
    unqualified.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')).to_string()
}

fn text(row: &Record, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(row: &Record, key: &str) -> Option<u32> {
    let value = match row.get(key)? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(value).ok().filter(|v| *v > 0)
}

fn flag(row: &Record, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => s.eq_ignore_ascii_case("YES") || s == "1",
        _ => false,
    }
}
