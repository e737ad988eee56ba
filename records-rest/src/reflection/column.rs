//! Reflected column metadata

use serde::{Deserialize, Serialize};

use super::reflector::RawColumn;
use super::types::{LogicalType, NativeType, TypeConverter};
use crate::db::Dialect;

/// One column of a reflected table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: LogicalType,
    /// Character or byte length; 0 when unspecified
    #[serde(default, skip_serializing_if = "is_zero")]
    pub length: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub precision: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub scale: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(rename = "pk", default, skip_serializing_if = "is_false")]
    pub is_primary_key: bool,
    /// Name of the referenced table; empty when the column is no foreign key
    #[serde(rename = "fk", default, skip_serializing_if = "String::is_empty")]
    pub foreign_key_target: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u32) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl ReflectedColumn {
    /// Create a column of the given type with default size attributes
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: 0,
            precision: 0,
            scale: 0,
            nullable: false,
            is_primary_key: false,
            foreign_key_target: String::new(),
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    #[must_use]
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.foreign_key_target = table.into();
        self
    }

    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Build a column from raw introspection output
    #[must_use]
    pub fn from_raw(dialect: Dialect, raw: &RawColumn) -> Self {
        let declared = if raw.column_type.is_empty() {
            &raw.data_type
        } else {
            &raw.column_type
        };
        let native = NativeType::parse(declared);
        let mut column_type = TypeConverter::new(dialect).to_logical(&native.base);

        let argument = |index: usize| native.arguments.get(index).copied();
        if dialect == Dialect::MySql && native.base == "tinyint" && argument(0) == Some(1) {
            column_type = LogicalType::Boolean;
        }

        let mut column = Self::new(raw.name.clone(), column_type);
        column.nullable = raw.nullable;
        if column_type.has_length() {
            column.length = raw.length.or_else(|| argument(0)).unwrap_or(0);
        }
        if column_type.has_precision() {
            column.precision = raw.precision.or_else(|| argument(0)).unwrap_or(0);
            column.scale = raw.scale.or_else(|| argument(1)).unwrap_or(0);
        }
        column
    }

    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        !self.foreign_key_target.is_empty()
    }

    #[must_use]
    pub fn is_geometry(&self) -> bool {
        self.column_type == LogicalType::Geometry
    }

    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.column_type.is_binary()
    }

    #[must_use]
    pub fn is_boolean(&self) -> bool {
        self.column_type == LogicalType::Boolean
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.column_type.is_numeric()
    }

    /// Length used in declarations
    #[must_use]
    pub fn declared_length(&self) -> u32 {
        if self.length == 0 {
            LogicalType::DEFAULT_LENGTH
        } else {
            self.length
        }
    }

    /// Precision and scale used in declarations
    #[must_use]
    pub fn declared_precision(&self) -> (u32, u32) {
        if self.precision == 0 {
            (LogicalType::DEFAULT_PRECISION, LogicalType::DEFAULT_SCALE)
        } else {
            (self.precision, self.scale)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, data_type: &str, column_type: &str) -> RawColumn {
        RawColumn {
            name: name.to_string(),
            nullable: true,
            data_type: data_type.to_string(),
            length: None,
            precision: None,
            scale: None,
            column_type: column_type.to_string(),
        }
    }

    #[test]
    fn test_mysql_boolean_from_tinyint() {
        let column = ReflectedColumn::from_raw(Dialect::MySql, &raw("active", "tinyint", "tinyint(1)"));
        assert_eq!(column.column_type, LogicalType::Boolean);

        let column = ReflectedColumn::from_raw(Dialect::MySql, &raw("rank", "tinyint", "tinyint(4)"));
        assert_eq!(column.column_type, LogicalType::Integer);
        assert_eq!(column.length, 0);
    }

    #[test]
    fn test_lengths_from_type_arguments() {
        let column = ReflectedColumn::from_raw(Dialect::Sqlite, &raw("title", "VARCHAR(100)", ""));
        assert_eq!(column.column_type, LogicalType::Varchar);
        assert_eq!(column.length, 100);

        let column = ReflectedColumn::from_raw(Dialect::Sqlite, &raw("price", "DECIMAL(10,2)", ""));
        assert_eq!(column.column_type, LogicalType::Decimal);
        assert_eq!((column.precision, column.scale), (10, 2));
    }

    #[test]
    fn test_introspected_sizes_win() {
        let mut input = raw("price", "numeric", "");
        input.precision = Some(12);
        input.scale = Some(3);
        let column = ReflectedColumn::from_raw(Dialect::Postgres, &input);
        assert_eq!((column.precision, column.scale), (12, 3));
    }

    #[test]
    fn test_blank_view_type_is_clob() {
        let column = ReflectedColumn::from_raw(Dialect::Sqlite, &raw("total", "", ""));
        assert_eq!(column.column_type, LogicalType::Clob);
    }

    #[test]
    fn test_json_shape() {
        let column = ReflectedColumn::new("category_id", LogicalType::Integer).references("categories");
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "category_id", "type": "integer", "fk": "categories"})
        );

        let parsed: ReflectedColumn = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, column);
    }

    #[test]
    fn test_declared_defaults() {
        let column = ReflectedColumn::new("name", LogicalType::Varchar);
        assert_eq!(column.declared_length(), 255);
        let column = ReflectedColumn::new("price", LogicalType::Decimal);
        assert_eq!(column.declared_precision(), (19, 4));
    }
}
