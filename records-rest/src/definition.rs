//! Schema changes through table and column definitions

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use records_common::error::{Error, Result};

use crate::db::{GenericDefinition, SqlExecutor};
use crate::reflection::{ReflectedColumn, ReflectedTable, ReflectionService};

/// Reads and changes table definitions, keeping reflection current
pub struct DefinitionService {
    reflection: Arc<ReflectionService>,
    definition: GenericDefinition,
}

impl DefinitionService {
    #[must_use]
    pub fn new(reflection: Arc<ReflectionService>, executor: Arc<dyn SqlExecutor>) -> Self {
        let definition = GenericDefinition::new(executor, reflection.schema());
        Self {
            reflection,
            definition,
        }
    }

    /// Every exposed table as `{"tables": [...]}`
    ///
    /// # Errors
    /// Returns a database error when reflection fails.
    pub async fn read_database(&self) -> Result<Value> {
        let mut tables = Vec::new();
        for name in self.reflection.get_table_names().await? {
            if let Some(table) = self.reflection.get_table(&name).await? {
                tables.push(serde_json::to_value(table.as_ref())?);
            }
        }
        Ok(json!({ "tables": tables }))
    }

    /// # Errors
    /// Returns `TableNotFound` for an unknown table.
    pub async fn read_table(&self, name: &str) -> Result<Arc<ReflectedTable>> {
        self.table(name).await
    }

    /// # Errors
    /// Returns `TableNotFound` or `ColumnNotFound` for unknown names.
    pub async fn read_column(&self, table: &str, column: &str) -> Result<ReflectedColumn> {
        let table = self.table(table).await?;
        table
            .column(column)
            .cloned()
            .ok_or_else(|| Error::ColumnNotFound(format!("{}.{column}", table.name())))
    }

    /// # Errors
    /// Returns `TableNotFound` for an unknown table, `InvalidInput` when the
    /// new name is taken, or a storage error.
    pub async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.table(from).await?;
        self.ensure_absent(to).await?;
        self.definition.rename_table(from, to).await?;
        info!(from, to, "Renamed table");
        self.reflection.refresh_tables().await
    }

    /// Create a table; foreign keys reference the primary key of their target
    ///
    /// # Errors
    /// Returns `InvalidInput` when the table exists, `TableNotFound` for a
    /// referenced table without a key, or a storage error.
    pub async fn create_table(&self, table: &ReflectedTable) -> Result<()> {
        self.ensure_absent(table.name()).await?;
        if table.columns().next().is_none() {
            return Err(Error::InvalidInput(format!(
                "Table {} has no columns",
                table.name()
            )));
        }

        let mut targets = Vec::new();
        for (column, target) in table.foreign_keys() {
            targets.push((column.to_string(), self.referenced_key(target).await?));
        }
        let references: Vec<_> = targets
            .iter()
            .map(|(column, (target, key))| (column.clone(), (target.as_str(), key.as_str())))
            .collect();

        self.definition.create_table(table, &references).await?;
        info!(table = table.name(), "Created table");
        self.reflection.refresh_tables().await
    }

    /// # Errors
    /// Returns `TableNotFound` for an unknown table, or a storage error.
    pub async fn remove_table(&self, name: &str) -> Result<()> {
        let table = self.table(name).await?;
        self.definition.remove_table(name, table.kind()).await?;
        info!(table = name, "Removed table");
        self.reflection.refresh_tables().await
    }

    /// # Errors
    /// Returns `TableNotFound` or `ColumnNotFound` for unknown names,
    /// `InvalidInput` when the new name is taken, or a storage error.
    pub async fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<()> {
        let reflected = self.table(table).await?;
        if !reflected.has_column(from) {
            return Err(Error::ColumnNotFound(format!("{table}.{from}")));
        }
        if reflected.has_column(to) {
            return Err(Error::InvalidInput(format!(
                "Column already exists: {table}.{to}"
            )));
        }
        self.definition.rename_column(table, from, to).await?;
        info!(table, from, to, "Renamed column");
        self.reflection.refresh_table(table).await
    }

    /// # Errors
    /// Returns `TableNotFound` for an unknown table, `InvalidInput` when the
    /// column exists, or a storage error.
    pub async fn add_column(&self, table: &str, column: &ReflectedColumn) -> Result<()> {
        let reflected = self.table(table).await?;
        if reflected.has_column(&column.name) {
            return Err(Error::InvalidInput(format!(
                "Column already exists: {table}.{}",
                column.name
            )));
        }
        let target = if column.is_foreign_key() {
            Some(self.referenced_key(&column.foreign_key_target).await?)
        } else {
            None
        };
        let reference = target
            .as_ref()
            .map(|(target, key)| (target.as_str(), key.as_str()));
        self.definition.add_column(table, column, reference).await?;
        info!(table, column = %column.name, "Added column");
        self.reflection.refresh_table(table).await
    }

    /// # Errors
    /// Returns `TableNotFound` or `ColumnNotFound` for unknown names, or a
    /// storage error.
    pub async fn remove_column(&self, table: &str, column: &str) -> Result<()> {
        let reflected = self.table(table).await?;
        if !reflected.has_column(column) {
            return Err(Error::ColumnNotFound(format!("{table}.{column}")));
        }
        self.definition.remove_column(table, column).await?;
        info!(table, column, "Removed column");
        self.reflection.refresh_table(table).await
    }

    async fn table(&self, name: &str) -> Result<Arc<ReflectedTable>> {
        self.reflection
            .get_table(name)
            .await?
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    async fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.reflection.has_table(name).await? {
            return Err(Error::InvalidInput(format!("Table already exists: {name}")));
        }
        Ok(())
    }

    async fn referenced_key(&self, target: &str) -> Result<(String, String)> {
        let table = self.table(target).await?;
        let pk = table.pk().ok_or_else(|| {
            Error::InvalidInput(format!("Referenced table {target} has no primary key"))
        })?;
        Ok((target.to_string(), pk.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Arguments, Dialect, PoolExecutor, PoolSettings};
    use crate::reflection::{LogicalType, TableKind};

    async fn service() -> DefinitionService {
        let executor: Arc<dyn SqlExecutor> = Arc::new(
            PoolExecutor::connect_url(Dialect::Sqlite, "sqlite::memory:", PoolSettings::default())
                .await
                .unwrap(),
        );
        executor
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, username VARCHAR(255) NOT NULL)",
                &Arguments::new(Dialect::Sqlite),
            )
            .await
            .unwrap();
        let reflection = Arc::new(ReflectionService::uncached(executor.clone()));
        DefinitionService::new(reflection, executor)
    }

    #[tokio::test]
    async fn test_create_and_remove_table() {
        let service = service().await;
        let posts = ReflectedTable::new(
            "posts",
            TableKind::Table,
            vec![
                ReflectedColumn::new("id", LogicalType::Integer).primary_key(),
                ReflectedColumn::new("user_id", LogicalType::Integer).references("users"),
                ReflectedColumn::new("title", LogicalType::Varchar).with_length(100),
            ],
        );
        service.create_table(&posts).await.unwrap();

        let created = service.read_table("posts").await.unwrap();
        assert_eq!(created.pk().unwrap().name, "id");
        assert_eq!(created.column("user_id").unwrap().foreign_key_target, "users");
        assert_eq!(created.column("title").unwrap().length, 100);

        let error = service.create_table(&posts).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));

        service.remove_table("posts").await.unwrap();
        assert!(matches!(
            service.read_table("posts").await.unwrap_err(),
            Error::TableNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_column_changes_refresh_reflection() {
        let service = service().await;
        let email = ReflectedColumn::new("email", LogicalType::Varchar)
            .with_length(320)
            .nullable();
        service.add_column("users", &email).await.unwrap();
        assert_eq!(service.read_column("users", "email").await.unwrap().length, 320);

        service.rename_column("users", "email", "mail").await.unwrap();
        let users = service.read_table("users").await.unwrap();
        assert!(users.has_column("mail"));
        assert!(!users.has_column("email"));

        service.remove_column("users", "mail").await.unwrap();
        assert!(matches!(
            service.read_column("users", "mail").await.unwrap_err(),
            Error::ColumnNotFound(_)
        ));
        assert!(matches!(
            service.remove_column("users", "mail").await.unwrap_err(),
            Error::ColumnNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_rename_table_and_read_database() {
        let service = service().await;
        service.rename_table("users", "members").await.unwrap();
        let database = service.read_database().await.unwrap();
        assert_eq!(database["tables"][0]["name"], "members");
        assert_eq!(database["tables"][0]["type"], "table");
        assert!(service.rename_table("users", "people").await.is_err());
    }
}
