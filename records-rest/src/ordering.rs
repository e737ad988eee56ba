//! Result ordering from `order` parameters

use crate::params::QueryParams;
use crate::reflection::ReflectedTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A column with its sort direction
pub type OrderColumn = (String, Direction);

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderingInfo;

impl OrderingInfo {
    /// Ordering requested through `order=column[,direction]`; unknown
    /// columns are dropped and the default ordering applies when none remain
    #[must_use]
    pub fn column_ordering(&self, table: &ReflectedTable, params: &QueryParams) -> Vec<OrderColumn> {
        let fields: Vec<OrderColumn> = params
            .get("order")
            .iter()
            .filter_map(|order| {
                let mut parts = order.splitn(2, ',');
                let column = parts.next()?.trim();
                if !table.has_column(column) {
                    return None;
                }
                let descending = parts
                    .next()
                    .is_some_and(|dir| dir.trim().to_uppercase().starts_with("DESC"));
                let direction = if descending {
                    Direction::Desc
                } else {
                    Direction::Asc
                };
                Some((column.to_string(), direction))
            })
            .collect();
        if fields.is_empty() {
            self.default_ordering(table)
        } else {
            fields
        }
    }

    /// Primary key ascending, or every column ascending for key-less tables
    #[must_use]
    pub fn default_ordering(&self, table: &ReflectedTable) -> Vec<OrderColumn> {
        match table.pk() {
            Some(pk) => vec![(pk.name.clone(), Direction::Asc)],
            None => table
                .column_names()
                .into_iter()
                .map(|name| (name, Direction::Asc))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{LogicalType, ReflectedColumn, TableKind};

    fn table(with_pk: bool) -> ReflectedTable {
        let id = ReflectedColumn::new("id", LogicalType::Integer);
        let id = if with_pk { id.primary_key() } else { id };
        ReflectedTable::new(
            "events",
            TableKind::Table,
            vec![id, ReflectedColumn::new("name", LogicalType::Varchar)],
        )
    }

    #[test]
    fn test_explicit_ordering() {
        let params = QueryParams::parse("order=name,desc&order=id&order=ghost,desc");
        assert_eq!(
            OrderingInfo.column_ordering(&table(true), &params),
            vec![
                ("name".to_string(), Direction::Desc),
                ("id".to_string(), Direction::Asc)
            ]
        );
    }

    #[test]
    fn test_direction_prefix() {
        let params = QueryParams::parse("order=name,Descending");
        assert_eq!(
            OrderingInfo.column_ordering(&table(true), &params)[0].1,
            Direction::Desc
        );
        let params = QueryParams::parse("order=name,dsc");
        assert_eq!(
            OrderingInfo.column_ordering(&table(true), &params)[0].1,
            Direction::Asc
        );
    }

    #[test]
    fn test_default_ordering() {
        let params = QueryParams::parse("order=ghost");
        assert_eq!(
            OrderingInfo.column_ordering(&table(true), &params),
            vec![("id".to_string(), Direction::Asc)]
        );
        assert_eq!(OrderingInfo.default_ordering(&table(false)).len(), 2);
    }
}
