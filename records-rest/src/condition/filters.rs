//! Grouping of `filter` query parameters
//!
//! `filter` holds root conditions. The suffix of any other `filter*` key is
//! its group path, split into runs of digits and letters: `filter10` is
//! group `10`, `filter1g` is subgroup `g` of group `1`. Conditions in one
//! group are ANDed; sibling groups are ORed together and ANDed with their
//! parent.

use super::Condition;
use crate::params::QueryParams;
use crate::path_tree::PathTree;
use crate::reflection::ReflectedTable;

/// Conditions arranged by group path
#[derive(Debug, Clone, Default)]
pub struct FilterGroups {
    tree: PathTree<Condition>,
}

impl FilterGroups {
    /// Add a condition to the group at `path`
    pub fn add(&mut self, path: &[String], condition: Condition) {
        self.tree.put(path, condition);
    }

    /// Fold the groups into one condition
    #[must_use]
    pub fn combine(&self) -> Condition {
        combine(&self.tree)
    }
}

fn combine(tree: &PathTree<Condition>) -> Condition {
    let and = Condition::all(tree.values().iter().cloned());
    let or = Condition::any(tree.branches().map(|(_, branch)| combine(branch)));
    and.and(or)
}

/// Reads filter groups from query parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterInfo;

impl FilterInfo {
    /// Parse every `filter*` parameter into groups
    #[must_use]
    pub fn groups(&self, table: &ReflectedTable, params: &QueryParams) -> FilterGroups {
        let mut groups = FilterGroups::default();
        for key in params.keys() {
            let Some(path) = group_path(key) else {
                continue;
            };
            for filter in params.get(key) {
                let condition = Condition::parse(table, filter);
                if !condition.is_none() {
                    groups.add(&path, condition);
                }
            }
        }
        groups
    }

    /// The combined condition of all filter parameters
    #[must_use]
    pub fn combined_conditions(&self, table: &ReflectedTable, params: &QueryParams) -> Condition {
        self.groups(table, params).combine()
    }
}

/// Group path of a `filter*` key; `None` for other keys
fn group_path(key: &str) -> Option<Vec<String>> {
    let suffix = key.strip_prefix("filter")?;
    if !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let mut path: Vec<String> = Vec::new();
    let mut digits = None;
    for c in suffix.chars() {
        let is_digit = c.is_ascii_digit();
        match path.last_mut() {
            Some(run) if digits == Some(is_digit) => run.push(c),
            _ => path.push(c.to_string()),
        }
        digits = Some(is_digit);
    }
    Some(path)
}
