//! Column selection through `include`, `exclude` and `mandatory` parameters

use records_common::types::Record;

use crate::params::QueryParams;
use crate::reflection::ReflectedTable;

/// Decides which columns of a table a request returns
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnIncluder;

impl ColumnIncluder {
    /// Names of the selected columns, in reflection order
    ///
    /// `include` keeps matching columns, then `exclude` drops matching
    /// columns; a `table.column` listed under `mandatory` survives both.
    #[must_use]
    pub fn names(&self, table: &ReflectedTable, primary: bool, params: &QueryParams) -> Vec<String> {
        let names = table.column_names();
        let names = select(table.name(), primary, params, "include", names, true);
        select(table.name(), primary, params, "exclude", names, false)
    }

    /// Restrict a record to the selected columns
    #[must_use]
    pub fn values(
        &self,
        table: &ReflectedTable,
        primary: bool,
        record: &Record,
        params: &QueryParams,
    ) -> Record {
        let mut result = Record::new();
        for name in self.names(table, primary, params) {
            if let Some(value) = record.get(&name) {
                result.insert(name, value.clone());
            }
        }
        result
    }
}

fn is_mandatory(table: &str, column: &str, params: &QueryParams) -> bool {
    let key = format!("{table}.{column}");
    params.get("mandatory").iter().any(|m| *m == key)
}

fn select(
    table: &str,
    primary: bool,
    params: &QueryParams,
    param: &str,
    names: Vec<String>,
    include: bool,
) -> Vec<String> {
    if !params.contains(param) {
        return names;
    }
    let patterns = params.list(param);
    let listed = |pattern: &str| patterns.iter().any(|p| *p == pattern);

    names
        .into_iter()
        .filter(|column| {
            let mut matched = listed("*.*")
                || listed(&format!("{table}.*"))
                || listed(&format!("{table}.{column}"));
            if primary && !matched {
                matched = listed("*") || listed(column);
            }
            matched == include || is_mandatory(table, column, params)
        })
        .collect()
}
