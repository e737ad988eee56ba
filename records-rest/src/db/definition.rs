//! Table and column definition statements

use std::sync::Arc;

use tracing::info;

use records_common::error::Result;

use super::builder::ColumnsBuilder;
use super::dialect::Dialect;
use super::executor::SqlExecutor;
use super::value::Arguments;
use crate::reflection::{LogicalType, ReflectedColumn, ReflectedTable, TableKind, TypeConverter};

/// Referenced table and key column of a foreign key
pub type Reference<'a> = (&'a str, &'a str);

/// Dialect-aware DDL for the minimal set of schema changes
pub struct GenericDefinition {
    executor: Arc<dyn SqlExecutor>,
    builder: ColumnsBuilder,
    types: TypeConverter,
}

impl GenericDefinition {
    #[must_use]
    pub fn new(executor: Arc<dyn SqlExecutor>, schema: &str) -> Self {
        let dialect = executor.dialect();
        Self {
            executor,
            builder: ColumnsBuilder::new(dialect, schema),
            types: TypeConverter::new(dialect),
        }
    }

    fn dialect(&self) -> Dialect {
        self.builder.dialect()
    }

    /// # Errors
    /// Returns a storage error when the statement fails.
    pub async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        let dialect = self.dialect();
        let sql = match dialect {
            Dialect::MySql => format!(
                "RENAME TABLE {} TO {}",
                self.builder.table_name(from),
                self.builder.table_name(to)
            ),
            Dialect::SqlServer => format!(
                "EXEC sp_rename {}, {}",
                string_literal(&self.builder.table_name(from)),
                string_literal(to)
            ),
            Dialect::Postgres | Dialect::Sqlite => format!(
                "ALTER TABLE {} RENAME TO {}",
                self.builder.table_name(from),
                dialect.quote(to)
            ),
        };
        self.run(&sql).await
    }

    /// Create a table with its primary key and foreign keys
    ///
    /// `references` resolves the key column of each referenced table.
    ///
    /// # Errors
    /// Returns a storage error when the statement fails.
    pub async fn create_table(
        &self,
        table: &ReflectedTable,
        references: &[(String, Reference<'_>)],
    ) -> Result<()> {
        self.run(&self.create_table_sql(table, references)).await
    }

    /// # Errors
    /// Returns a storage error when the statement fails.
    pub async fn remove_table(&self, name: &str, kind: TableKind) -> Result<()> {
        let keyword = match kind {
            TableKind::Table => "TABLE",
            TableKind::View => "VIEW",
        };
        let sql = format!("DROP {keyword} {}", self.builder.table_name(name));
        self.run(&sql).await
    }

    /// # Errors
    /// Returns a storage error when the statement fails.
    pub async fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<()> {
        let dialect = self.dialect();
        let sql = match dialect {
            Dialect::SqlServer => format!(
                "EXEC sp_rename {}, {}, 'COLUMN'",
                string_literal(&format!(
                    "{}.{}",
                    self.builder.table_name(table),
                    dialect.quote(from)
                )),
                string_literal(to)
            ),
            Dialect::MySql | Dialect::Postgres | Dialect::Sqlite => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.builder.table_name(table),
                dialect.quote(from),
                dialect.quote(to)
            ),
        };
        self.run(&sql).await
    }

    /// Add a column, with its foreign key when `reference` is given
    ///
    /// # Errors
    /// Returns a storage error when a statement fails.
    pub async fn add_column(
        &self,
        table: &str,
        column: &ReflectedColumn,
        reference: Option<Reference<'_>>,
    ) -> Result<()> {
        let dialect = self.dialect();
        let table_name = self.builder.table_name(table);
        let mut definition = format!(
            "{} {}",
            dialect.quote(&column.name),
            self.column_definition(column)
        );
        if let (Dialect::Sqlite, Some((target, key))) = (dialect, reference) {
            // sqlite cannot add constraints to an existing table
            definition.push_str(&format!(
                " REFERENCES {} ({})",
                dialect.quote(target),
                dialect.quote(key)
            ));
        }
        let keyword = if dialect == Dialect::SqlServer {
            "ADD"
        } else {
            "ADD COLUMN"
        };
        self.run(&format!("ALTER TABLE {table_name} {keyword} {definition}"))
            .await?;

        if let Some(reference) = reference.filter(|_| dialect != Dialect::Sqlite) {
            let constraint = self.foreign_key(table, &column.name, reference);
            self.run(&format!("ALTER TABLE {table_name} ADD {constraint}"))
                .await?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns a storage error when the statement fails.
    pub async fn remove_column(&self, table: &str, column: &str) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.builder.table_name(table),
            self.dialect().quote(column)
        );
        self.run(&sql).await
    }

    fn create_table_sql(&self, table: &ReflectedTable, references: &[(String, Reference<'_>)]) -> String {
        let mut parts: Vec<String> = table
            .columns()
            .map(|column| {
                format!(
                    "{} {}",
                    self.dialect().quote(&column.name),
                    self.column_definition(column)
                )
            })
            .collect();
        for (column, reference) in references {
            parts.push(self.foreign_key(table.name(), column, *reference));
        }
        format!(
            "CREATE TABLE {} ({})",
            self.builder.table_name(table.name()),
            parts.join(", ")
        )
    }

    /// Type, nullability and key clause of a column
    fn column_definition(&self, column: &ReflectedColumn) -> String {
        let dialect = self.dialect();
        if column.is_primary_key && column.column_type.is_integer() {
            let big = column.column_type == LogicalType::Bigint;
            return match dialect {
                Dialect::MySql => format!(
                    "{} NOT NULL AUTO_INCREMENT PRIMARY KEY",
                    if big { "BIGINT" } else { "INT" }
                ),
                Dialect::Postgres => {
                    format!("{} PRIMARY KEY", if big { "BIGSERIAL" } else { "SERIAL" })
                }
                Dialect::SqlServer => format!(
                    "{} IDENTITY NOT NULL PRIMARY KEY",
                    if big { "BIGINT" } else { "INT" }
                ),
                Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            };
        }
        let mut definition = self.native_type(column);
        if column.is_primary_key {
            definition.push_str(" NOT NULL PRIMARY KEY");
        } else if column.nullable {
            definition.push_str(" NULL");
        } else {
            definition.push_str(" NOT NULL");
        }
        definition
    }

    fn native_type(&self, column: &ReflectedColumn) -> String {
        let base = self.types.to_native(column.column_type);
        if column.column_type.has_length() {
            format!("{base}({})", column.declared_length())
        } else if column.column_type.has_precision() {
            let (precision, scale) = column.declared_precision();
            format!("{base}({precision},{scale})")
        } else {
            base.to_string()
        }
    }

    fn foreign_key(&self, table: &str, column: &str, (target, key): Reference<'_>) -> String {
        let dialect = self.dialect();
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            dialect.quote(&format!("{table}_{column}_fkey")),
            dialect.quote(column),
            self.builder.table_name(target),
            dialect.quote(key)
        )
    }

    async fn run(&self, sql: &str) -> Result<()> {
        let args = Arguments::new(self.dialect());
        self.executor.execute(sql, &args).await?;
        info!(dialect = %self.dialect(), "{sql}");
        Ok(())
    }
}

fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
