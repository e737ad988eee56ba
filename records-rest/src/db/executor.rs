//! Statement execution seam between SQL generation and a driver

use async_trait::async_trait;

use records_common::error::Result;
use records_common::types::Record;

use super::dialect::Dialect;
use super::value::Arguments;

/// Outcome of a data-changing statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Runs parameterized statements against one database
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Dialect of the statements this executor accepts
    fn dialect(&self) -> Dialect;

    /// Run a query and decode every row into a record keyed by column label
    async fn fetch_all(&self, sql: &str, args: &Arguments) -> Result<Vec<Record>>;

    /// Run a data-changing statement
    async fn execute(&self, sql: &str, args: &Arguments) -> Result<ExecuteResult>;

    /// Check connectivity
    async fn ping(&self) -> Result<()> {
        let args = Arguments::new(self.dialect());
        self.fetch_all("SELECT 1", &args).await.map(|_| ())
    }
}
