//! Per-request view of the reflected schema filtered by policy

use std::sync::Arc;

use records_common::error::Result;
use records_common::types::Record;

use super::service::ReflectionService;
use super::table::ReflectedTable;
use crate::condition::Condition;
use crate::policy::{Operation, Policies};

/// The schema as one operation may see it
///
/// Hidden tables behave as absent and hidden columns are dropped from a
/// copy of the table; the shared snapshot is never modified.
#[derive(Clone, Copy)]
pub struct SchemaView<'a> {
    reflection: &'a ReflectionService,
    policies: &'a Policies,
    operation: Operation,
}

impl<'a> SchemaView<'a> {
    #[must_use]
    pub fn new(reflection: &'a ReflectionService, policies: &'a Policies, operation: Operation) -> Self {
        Self {
            reflection,
            policies,
            operation,
        }
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// # Errors
    /// Returns a database error when reflection fails.
    pub async fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.table_visible(name) && self.reflection.has_table(name).await?)
    }

    /// Visible table names, sorted
    ///
    /// # Errors
    /// Returns a database error when reflection fails.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self
            .reflection
            .get_table_names()
            .await?
            .into_iter()
            .filter(|name| self.table_visible(name))
            .collect())
    }

    /// The table restricted to its visible columns
    ///
    /// # Errors
    /// Returns a database error when reflection fails.
    pub async fn get_table(&self, name: &str) -> Result<Option<Arc<ReflectedTable>>> {
        if !self.table_visible(name) {
            return Ok(None);
        }
        let Some(table) = self.reflection.get_table(name).await? else {
            return Ok(None);
        };
        let authorization = &self.policies.authorization;
        if !authorization.has_column_rule() {
            return Ok(Some(table));
        }
        let operation = self.operation;
        let filtered = table.retain_columns(|column| {
            authorization.column_allowed(operation, name, &column.name)
        });
        Ok(Some(Arc::new(filtered)))
    }

    /// Row restriction ANDed into every statement on the table
    #[must_use]
    pub fn row_condition(&self, table: &ReflectedTable) -> Condition {
        self.policies
            .authorization
            .record_condition(self.operation, table)
            .and(self.policies.multi_tenancy.condition(self.operation, table))
    }

    /// Column values stamped into written records
    #[must_use]
    pub fn tenant_values(&self, table: &ReflectedTable) -> Record {
        self.policies.multi_tenancy.values(self.operation, table)
    }

    fn table_visible(&self, name: &str) -> bool {
        self.policies
            .authorization
            .table_allowed(self.operation, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Arguments, Dialect, PoolExecutor, PoolSettings, SqlExecutor};
    use crate::policy::Authorization;

    async fn reflection() -> ReflectionService {
        let executor =
            PoolExecutor::connect_url(Dialect::Sqlite, "sqlite::memory:", PoolSettings::default())
                .await
                .unwrap();
        let none = Arguments::new(Dialect::Sqlite);
        for sql in [
            "CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT, password TEXT)",
            "CREATE TABLE audit (id INTEGER PRIMARY KEY, message TEXT)",
        ] {
            executor.execute(sql, &none).await.unwrap();
        }
        ReflectionService::uncached(Arc::new(executor))
    }

    #[tokio::test]
    async fn test_hidden_tables_and_columns() {
        let reflection = reflection().await;
        let policies = Policies {
            authorization: Authorization::new()
                .with_table_rule(|_, table| table != "audit")
                .with_column_rule(|operation, _, column| {
                    column != "password" || !operation.is_read()
                }),
            ..Default::default()
        };

        let view = SchemaView::new(&reflection, &policies, Operation::Read);
        assert_eq!(view.table_names().await.unwrap(), vec!["users"]);
        assert!(!view.has_table("audit").await.unwrap());
        assert!(view.get_table("audit").await.unwrap().is_none());
        let users = view.get_table("users").await.unwrap().unwrap();
        assert!(!users.has_column("password"));
        assert_eq!(users.pk().unwrap().name, "id");

        let view = SchemaView::new(&reflection, &policies, Operation::Update);
        let users = view.get_table("users").await.unwrap().unwrap();
        assert!(users.has_column("password"));

        // the shared snapshot keeps every column
        let shared = reflection.get_table("users").await.unwrap().unwrap();
        assert!(shared.has_column("password"));
    }
}
