//! SQL fragments built from reflected columns

use serde_json::Value;

use records_common::error::Result;
use records_common::types::Record;

use super::dialect::Dialect;
use super::value::{Arguments, ValueConverter};
use crate::ordering::OrderColumn;
use crate::reflection::ReflectedTable;

/// Builds select lists, assignments and row windows for one dialect
#[derive(Debug, Clone)]
pub struct ColumnsBuilder {
    dialect: Dialect,
    schema: String,
    values: ValueConverter,
}

impl ColumnsBuilder {
    /// Builder qualifying table names with `schema` on engines with namespaces
    #[must_use]
    pub fn new(dialect: Dialect, schema: &str) -> Self {
        Self {
            dialect,
            schema: schema.to_string(),
            values: ValueConverter::new(dialect),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Quoted, possibly schema-qualified, table name
    #[must_use]
    pub fn table_name(&self, table: &str) -> String {
        match self.dialect {
            Dialect::Postgres | Dialect::SqlServer if !self.schema.is_empty() => format!(
                "{}.{}",
                self.dialect.quote(&self.schema),
                self.dialect.quote(table)
            ),
            _ => self.dialect.quote(table),
        }
    }

    /// Select list for the named columns; unknown names are skipped
    #[must_use]
    pub fn select(&self, table: &ReflectedTable, columns: &[String]) -> String {
        columns
            .iter()
            .filter_map(|name| table.column(name))
            .map(|column| self.values.select_expression(column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `" ORDER BY ..."`, or an empty string without ordering
    #[must_use]
    pub fn order_by(&self, ordering: &[OrderColumn]) -> String {
        if ordering.is_empty() {
            return String::new();
        }
        let fields: Vec<String> = ordering
            .iter()
            .map(|(column, direction)| {
                format!("{} {}", self.dialect.quote(column), direction.as_sql())
            })
            .collect();
        format!(" ORDER BY {}", fields.join(", "))
    }

    /// Row window, preceded by a neutral ORDER BY where the engine demands one
    #[must_use]
    pub fn offset_limit(&self, ordered: bool, offset: u64, limit: Option<u64>) -> String {
        let clause = self.dialect.limit_clause(offset, limit);
        if self.dialect == Dialect::SqlServer && !ordered && !clause.is_empty() {
            format!(" ORDER BY (SELECT NULL){clause}")
        } else {
            clause
        }
    }

    /// Column list and value list of an INSERT
    ///
    /// # Errors
    /// Returns `InvalidInput` when a value does not fit its column type.
    pub fn insert(
        &self,
        table: &ReflectedTable,
        record: &Record,
        args: &mut Arguments,
    ) -> Result<(String, String)> {
        let mut columns = Vec::with_capacity(record.len());
        let mut values = Vec::with_capacity(record.len());
        for (name, value) in record {
            let Some(column) = table.column(name) else {
                continue;
            };
            columns.push(self.dialect.quote(name));
            values.push(self.values.bind(column, value, args)?);
        }
        Ok((columns.join(", "), values.join(", ")))
    }

    /// Assignments of an UPDATE
    ///
    /// # Errors
    /// Returns `InvalidInput` when a value does not fit its column type.
    pub fn update(
        &self,
        table: &ReflectedTable,
        record: &Record,
        args: &mut Arguments,
    ) -> Result<String> {
        let mut assignments = Vec::with_capacity(record.len());
        for (name, value) in record {
            let Some(column) = table.column(name) else {
                continue;
            };
            let placeholder = self.values.bind(column, value, args)?;
            assignments.push(format!("{} = {placeholder}", self.dialect.quote(name)));
        }
        Ok(assignments.join(", "))
    }

    /// Assignments adding each value to its column; non-numeric columns are skipped
    ///
    /// # Errors
    /// Returns `InvalidInput` when a delta is not a number.
    pub fn increment(
        &self,
        table: &ReflectedTable,
        record: &Record,
        args: &mut Arguments,
    ) -> Result<String> {
        let mut assignments = Vec::with_capacity(record.len());
        for (name, value) in record {
            let Some(column) = table.column(name) else {
                continue;
            };
            if !column.is_numeric() || value.is_null() {
                continue;
            }
            let delta = match value {
                Value::String(text) => Value::String(text.trim().to_string()),
                other => other.clone(),
            };
            let quoted = self.dialect.quote(name);
            let placeholder = self.values.bind(column, &delta, args)?;
            assignments.push(format!("{quoted} = {quoted} + {placeholder}"));
        }
        Ok(assignments.join(", "))
    }
}
