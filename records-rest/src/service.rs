//! Record operations over reflected tables

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use records_common::error::{Error, Result};
use records_common::types::{ListDocument, Record, UNKNOWN_COUNT};

use crate::columns::ColumnIncluder;
use crate::condition::FilterInfo;
use crate::db::GenericDb;
use crate::joiner::RelationJoiner;
use crate::ordering::OrderingInfo;
use crate::pagination::PaginationInfo;
use crate::params::QueryParams;
use crate::policy::{Operation, Policies};
use crate::reflection::{ReflectedTable, ReflectionService, SchemaView};

/// List, read, create, update, delete and increment records of any table
pub struct RecordService {
    db: GenericDb,
    reflection: Arc<ReflectionService>,
    policies: Policies,
    columns: ColumnIncluder,
    filters: FilterInfo,
    ordering: OrderingInfo,
    pagination: PaginationInfo,
}

impl RecordService {
    #[must_use]
    pub fn new(db: GenericDb, reflection: Arc<ReflectionService>, policies: Policies) -> Self {
        Self {
            db,
            reflection,
            policies,
            columns: ColumnIncluder,
            filters: FilterInfo,
            ordering: OrderingInfo,
            pagination: PaginationInfo::default(),
        }
    }

    #[must_use]
    pub fn reflection(&self) -> &Arc<ReflectionService> {
        &self.reflection
    }

    #[must_use]
    pub fn db(&self) -> &GenericDb {
        &self.db
    }

    /// The schema as seen by `operation`
    #[must_use]
    pub fn view(&self, operation: Operation) -> SchemaView<'_> {
        SchemaView::new(&self.reflection, &self.policies, operation)
    }

    /// Whether `operation` may address `table`
    ///
    /// # Errors
    /// Returns a database error when reflection fails.
    pub async fn has_table(&self, table: &str, operation: Operation) -> Result<bool> {
        self.view(operation).has_table(table).await
    }

    /// Matching records, with the total count when a page was requested
    ///
    /// # Errors
    /// Returns `TableNotFound` for unknown or hidden tables, or a storage
    /// error.
    pub async fn list(&self, table: &str, params: &QueryParams) -> Result<ListDocument> {
        let view = self.view(Operation::List);
        let table = self.table(&view, table).await?;
        let joiner = self.joiner(view);
        let params = self.prepare(&joiner, &table, params).await?;

        let columns = self.columns.names(&table, true, &params);
        let condition = self
            .filters
            .combined_conditions(&table, &params)
            .and(view.row_condition(&table));
        let ordering = self.ordering.column_ordering(&table, &params);
        let offset = self.pagination.page_offset(&params);
        let limit = self.pagination.page_limit(&params);

        let count = if self.pagination.has_page(&params) {
            self.db.select_count(&table, &condition).await?
        } else {
            UNKNOWN_COUNT
        };
        let mut records = self
            .db
            .select_all(&table, &columns, &condition, &ordering, offset, limit)
            .await?;
        joiner.add_joins(&table, &mut records, &params).await?;
        debug!(table = table.name(), records = records.len(), count, "Listed records");
        Ok(ListDocument::new(records, count))
    }

    /// The record with primary key `id`, or `None` when it does not exist
    ///
    /// # Errors
    /// Returns `TableNotFound` for unknown or hidden tables,
    /// `OperationNotSupported` for tables without a primary key, or a storage
    /// error.
    pub async fn read(&self, table: &str, id: &str, params: &QueryParams) -> Result<Option<Record>> {
        let view = self.view(Operation::Read);
        let table = self.table(&view, table).await?;
        let joiner = self.joiner(view);
        let params = self.prepare(&joiner, &table, params).await?;

        let columns = self.columns.names(&table, true, &params);
        let Some(record) = self
            .db
            .select_single(&table, &columns, id, &view.row_condition(&table))
            .await?
        else {
            return Ok(None);
        };
        let mut records = vec![record];
        joiner.add_joins(&table, &mut records, &params).await?;
        Ok(records.pop())
    }

    /// Insert a record and return its primary key value
    ///
    /// # Errors
    /// Returns `TableNotFound` for unknown or hidden tables,
    /// `OperationNotSupported` for views, `InvalidInput` for values that do
    /// not fit their column, or a storage error.
    pub async fn create(&self, table: &str, record: Record, _params: &QueryParams) -> Result<Value> {
        let view = self.view(Operation::Create);
        let table = self.writable_table(&view, table).await?;
        let mut record = sanitize(&table, record, false);
        record.extend(view.tenant_values(&table));
        self.db.create_single(&table, &record).await
    }

    /// Update the record with primary key `id`; returns the affected row count
    ///
    /// # Errors
    /// Returns `TableNotFound` for unknown or hidden tables,
    /// `OperationNotSupported` for views and key-less tables, `InvalidInput`
    /// for values that do not fit their column, or a storage error.
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        record: Record,
        _params: &QueryParams,
    ) -> Result<u64> {
        let view = self.view(Operation::Update);
        let table = self.writable_table(&view, table).await?;
        let mut record = sanitize(&table, record, true);
        record.extend(view.tenant_values(&table));
        self.db
            .update_single(&table, &record, id, &view.row_condition(&table))
            .await
    }

    /// Delete the record with primary key `id`; returns the affected row count
    ///
    /// # Errors
    /// Returns `TableNotFound` for unknown or hidden tables,
    /// `OperationNotSupported` for views and key-less tables, or a storage
    /// error.
    pub async fn delete(&self, table: &str, id: &str, _params: &QueryParams) -> Result<u64> {
        let view = self.view(Operation::Delete);
        let table = self.writable_table(&view, table).await?;
        self.db
            .delete_single(&table, id, &view.row_condition(&table))
            .await
    }

    /// Add the numeric fields of `record` to the record with primary key `id`
    ///
    /// # Errors
    /// Returns `TableNotFound` for unknown or hidden tables,
    /// `OperationNotSupported` for views and key-less tables, `InvalidInput`
    /// for deltas that are not numbers, or a storage error.
    pub async fn increment(
        &self,
        table: &str,
        id: &str,
        record: Record,
        _params: &QueryParams,
    ) -> Result<u64> {
        let view = self.view(Operation::Increment);
        let table = self.writable_table(&view, table).await?;
        let record = sanitize(&table, record, true);
        self.db
            .increment_single(&table, &record, id, &view.row_condition(&table))
            .await
    }

    fn joiner<'s>(&'s self, view: SchemaView<'s>) -> RelationJoiner<'s> {
        RelationJoiner::new(&self.db, view, self.policies.join_limits.records)
    }

    /// Apply join limits and force-include the key columns joins need
    async fn prepare(
        &self,
        joiner: &RelationJoiner<'_>,
        table: &Arc<ReflectedTable>,
        params: &QueryParams,
    ) -> Result<QueryParams> {
        let mut params = params.clone();
        params.remove("mandatory");
        self.policies.join_limits.apply(&mut params);
        joiner.add_mandatory_columns(table, &mut params).await?;
        Ok(params)
    }

    async fn table(&self, view: &SchemaView<'_>, name: &str) -> Result<Arc<ReflectedTable>> {
        view.get_table(name)
            .await?
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    async fn writable_table(&self, view: &SchemaView<'_>, name: &str) -> Result<Arc<ReflectedTable>> {
        let table = self.table(view, name).await?;
        if table.is_view() {
            return Err(Error::OperationNotSupported(format!(
                "Cannot {} records of view {name}",
                view.operation()
            )));
        }
        Ok(table)
    }
}

/// Drop unknown fields, and the primary key when the id comes from the path
fn sanitize(table: &ReflectedTable, mut record: Record, strip_pk: bool) -> Record {
    let pk = table.pk().map(|pk| pk.name.as_str());
    record.retain(|name, _| table.has_column(name) && !(strip_pk && Some(name.as_str()) == pk));
    record
}
