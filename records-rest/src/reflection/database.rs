//! Reflected database: the names and kinds of all exposed tables

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::table::TableKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectedDatabase {
    tables: BTreeMap<String, TableKind>,
}

impl ReflectedDatabase {
    /// Build from a table listing, dropping ignored tables and any table
    /// outside a non-empty allow-list
    #[must_use]
    pub fn from_listing(
        listing: Vec<(String, TableKind)>,
        ignored: &[&str],
        allowed: &[String],
    ) -> Self {
        let tables = listing
            .into_iter()
            .filter(|(name, _)| !ignored.contains(&name.as_str()))
            .filter(|(name, _)| allowed.is_empty() || allowed.iter().any(|a| a == name))
            .collect();
        Self { tables }
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    #[must_use]
    pub fn table_kind(&self, name: &str) -> Option<TableKind> {
        self.tables.get(name).copied()
    }

    /// Table names in lexicographic order
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
