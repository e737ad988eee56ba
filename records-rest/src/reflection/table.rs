//! Reflected table metadata

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::column::ReflectedColumn;

/// Whether a relation is a base table or a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    #[default]
    Table,
    View,
}

impl TableKind {
    /// Parse the `table_type` reported by introspection queries
    #[must_use]
    pub fn from_introspection(value: &str) -> Self {
        if value.to_uppercase().contains("VIEW") {
            Self::View
        } else {
            Self::Table
        }
    }
}

/// A table with its columns in reflection order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TableDocument", into = "TableDocument")]
pub struct ReflectedTable {
    name: String,
    kind: TableKind,
    columns: Vec<ReflectedColumn>,
    primary_key: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct TableDocument {
    name: String,
    #[serde(rename = "type", default)]
    kind: TableKind,
    columns: Vec<ReflectedColumn>,
}

impl From<TableDocument> for ReflectedTable {
    fn from(document: TableDocument) -> Self {
        Self::new(document.name, document.kind, document.columns)
    }
}

impl From<ReflectedTable> for TableDocument {
    fn from(table: ReflectedTable) -> Self {
        Self {
            name: table.name,
            kind: table.kind,
            columns: table.columns,
        }
    }
}

impl ReflectedTable {
    /// Create a table; a composite primary key leaves the table without a usable key
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TableKind, columns: Vec<ReflectedColumn>) -> Self {
        let mut keys = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_primary_key)
            .map(|(index, _)| index);
        let primary_key = match (keys.next(), keys.next()) {
            (Some(index), None) => Some(index),
            _ => None,
        };
        Self {
            name: name.into(),
            kind,
            columns,
            primary_key,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    #[must_use]
    pub fn is_view(&self) -> bool {
        self.kind == TableKind::View
    }

    pub fn columns(&self) -> impl Iterator<Item = &ReflectedColumn> {
        self.columns.iter()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ReflectedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The single primary key column
    #[must_use]
    pub fn pk(&self) -> Option<&ReflectedColumn> {
        self.primary_key.map(|index| &self.columns[index])
    }

    /// Foreign key columns mapped to the tables they reference
    #[must_use]
    pub fn foreign_keys(&self) -> BTreeMap<&str, &str> {
        self.columns
            .iter()
            .filter(|c| c.is_foreign_key())
            .map(|c| (c.name.as_str(), c.foreign_key_target.as_str()))
            .collect()
    }

    /// Columns referencing `table`
    #[must_use]
    pub fn fks_to(&self, table: &str) -> Vec<&ReflectedColumn> {
        self.columns
            .iter()
            .filter(|c| c.foreign_key_target == table)
            .collect()
    }

    /// A copy holding only the columns accepted by `keep`
    #[must_use]
    pub fn retain_columns(&self, keep: impl Fn(&ReflectedColumn) -> bool) -> Self {
        let columns = self.columns.iter().filter(|c| keep(c)).cloned().collect();
        Self::new(self.name.clone(), self.kind, columns)
    }
}
