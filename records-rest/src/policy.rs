//! Request policies: authorization, multi-tenancy and join limits
//!
//! Policies are plain functions supplied by the embedding application. They
//! never touch the shared reflected schema; the record service applies them
//! through a per-request `SchemaView`.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use records_common::config::JoinLimitsConfig;
use records_common::types::Record;

use crate::condition::{ColumnOperator, Condition};
use crate::params::QueryParams;
use crate::reflection::ReflectedTable;

/// Record operation a request performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
    Delete,
    Increment,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Increment => "increment",
        }
    }

    /// Whether the operation returns records (and may join)
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::List | Self::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type TableRule = Arc<dyn Fn(Operation, &str) -> bool + Send + Sync>;
pub type ColumnRule = Arc<dyn Fn(Operation, &str, &str) -> bool + Send + Sync>;
pub type RecordRule = Arc<dyn Fn(Operation, &ReflectedTable) -> Condition + Send + Sync>;
pub type TenancyRule = Arc<dyn Fn(Operation, &str) -> Record + Send + Sync>;

/// Visibility of tables and columns, and row restrictions
#[derive(Clone, Default)]
pub struct Authorization {
    table_rule: Option<TableRule>,
    column_rule: Option<ColumnRule>,
    record_rule: Option<RecordRule>,
}

impl Authorization {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables for which the rule returns false behave as absent
    #[must_use]
    pub fn with_table_rule(
        mut self,
        rule: impl Fn(Operation, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.table_rule = Some(Arc::new(rule));
        self
    }

    /// Columns for which the rule returns false are removed from the table
    #[must_use]
    pub fn with_column_rule(
        mut self,
        rule: impl Fn(Operation, &str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.column_rule = Some(Arc::new(rule));
        self
    }

    /// The returned condition is ANDed into every statement on the table
    #[must_use]
    pub fn with_record_rule(
        mut self,
        rule: impl Fn(Operation, &ReflectedTable) -> Condition + Send + Sync + 'static,
    ) -> Self {
        self.record_rule = Some(Arc::new(rule));
        self
    }

    #[must_use]
    pub fn table_allowed(&self, operation: Operation, table: &str) -> bool {
        self.table_rule
            .as_ref()
            .map_or(true, |rule| rule(operation, table))
    }

    #[must_use]
    pub fn column_allowed(&self, operation: Operation, table: &str, column: &str) -> bool {
        self.column_rule
            .as_ref()
            .map_or(true, |rule| rule(operation, table, column))
    }

    #[must_use]
    pub fn has_column_rule(&self) -> bool {
        self.column_rule.is_some()
    }

    #[must_use]
    pub fn record_condition(&self, operation: Operation, table: &ReflectedTable) -> Condition {
        self.record_rule
            .as_ref()
            .map_or(Condition::None, |rule| rule(operation, table))
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("table_rule", &self.table_rule.is_some())
            .field("column_rule", &self.column_rule.is_some())
            .field("record_rule", &self.record_rule.is_some())
            .finish()
    }
}

/// Column values pinning every statement to one tenant
#[derive(Clone, Default)]
pub struct MultiTenancy {
    rule: Option<TenancyRule>,
}

impl MultiTenancy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rule(
        mut self,
        rule: impl Fn(Operation, &str) -> Record + Send + Sync + 'static,
    ) -> Self {
        self.rule = Some(Arc::new(rule));
        self
    }

    /// Tenant column values that exist on the table
    #[must_use]
    pub fn values(&self, operation: Operation, table: &ReflectedTable) -> Record {
        let Some(rule) = &self.rule else {
            return Record::new();
        };
        rule(operation, table.name())
            .into_iter()
            .filter(|(column, _)| table.has_column(column))
            .collect()
    }

    /// Equality conditions on the tenant columns
    #[must_use]
    pub fn condition(&self, operation: Operation, table: &ReflectedTable) -> Condition {
        Condition::all(
            self.values(operation, table)
                .iter()
                .filter_map(|(name, value)| {
                    let column = table.column(name)?;
                    Some(match value {
                        Value::Null => Condition::column(column, ColumnOperator::IsNull, ""),
                        Value::String(text) => Condition::equals(column, text.as_str()),
                        other => Condition::equals(column, other.to_string()),
                    })
                }),
        )
    }
}

impl fmt::Debug for MultiTenancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiTenancy")
            .field("rule", &self.rule.is_some())
            .finish()
    }
}

/// Bounds on relationship joins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinLimits {
    /// Maximum tables in one join path
    pub depth: usize,
    /// Maximum joined tables per request
    pub tables: usize,
    /// Maximum records fetched per has-many or many-to-many join
    pub records: usize,
}

impl Default for JoinLimits {
    fn default() -> Self {
        Self::from(&JoinLimitsConfig::default())
    }
}

impl From<&JoinLimitsConfig> for JoinLimits {
    fn from(config: &JoinLimitsConfig) -> Self {
        Self {
            depth: config.depth,
            tables: config.tables,
            records: config.records,
        }
    }
}

impl JoinLimits {
    /// Truncate the `join` parameters to the depth and table limits
    pub fn apply(&self, params: &mut QueryParams) {
        if !params.contains("join") {
            return;
        }
        let mut count = 0;
        let mut paths = Vec::new();
        for join in params.get("join") {
            if count >= self.tables {
                break;
            }
            let path: Vec<&str> = join
                .split(',')
                .take(self.depth)
                .take(self.tables - count)
                .collect();
            count += path.len();
            paths.push(path.join(","));
        }
        params.set("join", paths);
    }
}

/// All policies applied by the record service
#[derive(Debug, Clone, Default)]
pub struct Policies {
    pub authorization: Authorization,
    pub multi_tenancy: MultiTenancy,
    pub join_limits: JoinLimits,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{LogicalType, ReflectedColumn, TableKind};
    use serde_json::json;

    fn posts() -> ReflectedTable {
        ReflectedTable::new(
            "posts",
            TableKind::Table,
            vec![
                ReflectedColumn::new("id", LogicalType::Integer).primary_key(),
                ReflectedColumn::new("tenant_id", LogicalType::Integer),
                ReflectedColumn::new("content", LogicalType::Varchar),
            ],
        )
    }

    #[test]
    fn test_authorization_defaults_allow() {
        let authorization = Authorization::new();
        assert!(authorization.table_allowed(Operation::List, "posts"));
        assert!(authorization.column_allowed(Operation::List, "posts", "id"));
        assert!(authorization.record_condition(Operation::List, &posts()).is_none());
    }

    #[test]
    fn test_authorization_rules() {
        let authorization = Authorization::new()
            .with_table_rule(|_, table| table != "secrets")
            .with_column_rule(|operation, _, column| {
                !(operation == Operation::Read && column == "content")
            });
        assert!(!authorization.table_allowed(Operation::List, "secrets"));
        assert!(!authorization.column_allowed(Operation::Read, "posts", "content"));
        assert!(authorization.column_allowed(Operation::List, "posts", "content"));
    }

    #[test]
    fn test_tenancy_condition() {
        let tenancy = MultiTenancy::new().with_rule(|_, _| {
            json!({"tenant_id": 7, "missing": 1}).as_object().cloned().unwrap_or_default()
        });
        let table = posts();
        let values = tenancy.values(Operation::Create, &table);
        assert_eq!(values.len(), 1);
        assert_eq!(
            tenancy.condition(Operation::List, &table),
            Condition::equals(table.column("tenant_id").unwrap(), "7")
        );
    }

    #[test]
    fn test_join_limits() {
        let limits = JoinLimits {
            depth: 2,
            tables: 3,
            records: 10,
        };
        let mut params = QueryParams::parse("join=comments,users,groups&join=tags&join=categories");
        limits.apply(&mut params);
        assert_eq!(params.get("join"), &["comments,users", "tags"]);

        let mut params = QueryParams::parse("page=1");
        limits.apply(&mut params);
        assert!(!params.contains("join"));
    }
}
