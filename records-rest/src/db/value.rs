//! Typed SQL values and their conversion from and to JSON

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Number, Value};

use records_common::error::{Error, Result};
use records_common::types::Record;

use super::dialect::Dialect;
use crate::reflection::{LogicalType, ReflectedColumn, ReflectedTable, TypeConverter};

/// A value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Statement arguments; pushing a value yields its placeholder
#[derive(Debug, Clone)]
pub struct Arguments {
    dialect: Dialect,
    values: Vec<SqlValue>,
}

impl Arguments {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// Append a value and return the placeholder referencing it
    pub fn push(&mut self, value: impl Into<SqlValue>) -> String {
        self.values.push(value.into());
        self.dialect.placeholder(self.values.len())
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column aware conversion between JSON and SQL
#[derive(Debug, Clone, Copy)]
pub struct ValueConverter {
    dialect: Dialect,
    types: TypeConverter,
}

impl ValueConverter {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            types: TypeConverter::new(dialect),
        }
    }

    /// Bind a JSON value for a column and return the SQL expression reading it
    ///
    /// # Errors
    /// Returns `InvalidInput` when the value does not fit the column type.
    pub fn bind(
        &self,
        column: &ReflectedColumn,
        value: &Value,
        args: &mut Arguments,
    ) -> Result<String> {
        let value = self.to_sql(column, value)?;
        Ok(self.bind_converted(column, value, args))
    }

    /// Bind a value already converted for `column`
    #[must_use]
    pub fn bind_converted(
        &self,
        column: &ReflectedColumn,
        value: SqlValue,
        args: &mut Arguments,
    ) -> String {
        let null = value == SqlValue::Null;
        let placeholder = args.push(value);
        if null {
            placeholder
        } else {
            self.wrap_placeholder(column, placeholder)
        }
    }

    /// Convert text such as a filter value or a record id; `None` when it
    /// does not fit the column type
    #[must_use]
    pub fn convert_text(&self, column: &ReflectedColumn, text: &str) -> Option<SqlValue> {
        self.to_sql(column, &Value::String(text.to_string())).ok()
    }

    /// Convert a JSON value into the SQL value stored in `column`
    ///
    /// # Errors
    /// Returns `InvalidInput` when the value does not fit the column type.
    pub fn to_sql(&self, column: &ReflectedColumn, value: &Value) -> Result<SqlValue> {
        let invalid = || {
            Error::InvalidInput(format!(
                "Invalid {} value for column {}: {value}",
                column.column_type.as_str(),
                column.name
            ))
        };
        let converted = match (column.column_type, value) {
            (_, Value::Null) => SqlValue::Null,
            (LogicalType::Boolean, value) => SqlValue::Bool(parse_bool(value).ok_or_else(invalid)?),
            (LogicalType::Integer | LogicalType::Bigint, value) => {
                SqlValue::Int(parse_integer(value).ok_or_else(invalid)?)
            }
            (LogicalType::Float | LogicalType::Double, value) => {
                SqlValue::Float(parse_float(value).ok_or_else(invalid)?)
            }
            (LogicalType::Decimal, value) => {
                let text = scalar_text(value).ok_or_else(invalid)?;
                text.trim().parse::<f64>().map_err(|_| invalid())?;
                SqlValue::Text(text.trim().to_string())
            }
            (LogicalType::Blob | LogicalType::Varbinary, Value::String(encoded)) => {
                match self.dialect {
                    Dialect::MySql | Dialect::Postgres => SqlValue::Text(encoded.clone()),
                    Dialect::SqlServer | Dialect::Sqlite => {
                        SqlValue::Bytes(BASE64.decode(encoded).map_err(|_| invalid())?)
                    }
                }
            }
            (LogicalType::Blob | LogicalType::Varbinary, _) => return Err(invalid()),
            (_, Value::String(text)) => SqlValue::Text(text.clone()),
            (_, Value::Array(_) | Value::Object(_)) => SqlValue::Text(serde_json::to_string(value)?),
            (_, _) => SqlValue::Text(scalar_text(value).ok_or_else(invalid)?),
        };
        Ok(converted)
    }

    /// Wrap a placeholder so the engine reads it as the column type
    #[must_use]
    pub fn wrap_placeholder(&self, column: &ReflectedColumn, placeholder: String) -> String {
        let column_type = column.column_type;
        match (self.dialect, column_type) {
            (Dialect::MySql | Dialect::Postgres, LogicalType::Geometry) => {
                format!("ST_GeomFromText({placeholder})")
            }
            (Dialect::SqlServer, LogicalType::Geometry) => {
                format!("geometry::STGeomFromText({placeholder},0)")
            }
            (Dialect::MySql, LogicalType::Blob | LogicalType::Varbinary) => {
                format!("FROM_BASE64({placeholder})")
            }
            (Dialect::Postgres, LogicalType::Blob | LogicalType::Varbinary) => {
                format!("decode({placeholder}, 'base64')")
            }
            (Dialect::Postgres, t) if !t.is_textual() => {
                format!("CAST({placeholder} AS {})", self.types.to_native(t))
            }
            _ => placeholder,
        }
    }

    /// Select list entry reading a column in a representation every driver decodes
    #[must_use]
    pub fn select_expression(&self, column: &ReflectedColumn) -> String {
        let quoted = self.dialect.quote(&column.name);
        let column_type = column.column_type;
        let expression = match (self.dialect, column_type) {
            (Dialect::MySql | Dialect::Postgres, LogicalType::Geometry) => {
                format!("ST_AsText({quoted})")
            }
            (Dialect::SqlServer, LogicalType::Geometry) => {
                format!("REPLACE({quoted}.STAsText(),' (','(')")
            }
            (Dialect::MySql, LogicalType::Blob | LogicalType::Varbinary) => {
                format!("TO_BASE64({quoted})")
            }
            (Dialect::Postgres, LogicalType::Blob | LogicalType::Varbinary) => {
                format!("encode({quoted}::bytea, 'base64')")
            }
            (Dialect::SqlServer, LogicalType::Blob | LogicalType::Varbinary) => format!(
                "CAST(N'' AS XML).value('xs:base64Binary(xs:hexBinary(sql:column({})))', 'VARCHAR(MAX)')",
                quoted.replace('"', "'")
            ),
            (Dialect::Postgres, t) if t.is_textual() || t.is_temporal() || t == LogicalType::Decimal => {
                format!("{quoted}::text")
            }
            (Dialect::MySql, t) if t.is_textual() || t.is_temporal() || t == LogicalType::Decimal => {
                format!("CAST({quoted} AS CHAR)")
            }
            (Dialect::MySql, t) if t.is_integer() || t == LogicalType::Boolean => {
                format!("CAST({quoted} AS SIGNED)")
            }
            _ => return quoted,
        };
        format!("{expression} AS {quoted}")
    }

    /// Normalize decoded row values to the JSON type of each column
    #[must_use]
    pub fn normalize_record(&self, table: &ReflectedTable, mut record: Record) -> Record {
        for (name, value) in &mut record {
            let Some(column) = table.column(name) else {
                continue;
            };
            normalize_value(column.column_type, value);
        }
        record
    }
}

#[allow(clippy::cast_possible_truncation)]
fn normalize_value(column_type: LogicalType, value: &mut Value) {
    let normalized = match (column_type, &*value) {
        (_, Value::Null) => return,
        (LogicalType::Boolean, current) => parse_bool(current).map(Value::Bool),
        (LogicalType::Integer | LogicalType::Bigint, Value::String(text)) => {
            text.trim().parse::<i64>().ok().map(Value::from)
        }
        (LogicalType::Integer | LogicalType::Bigint, Value::Number(n)) if !n.is_i64() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64)),
        (LogicalType::Float | LogicalType::Double, Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (LogicalType::Decimal, Value::Number(n)) => Some(Value::String(n.to_string())),
        (LogicalType::Blob | LogicalType::Varbinary, Value::String(text)) => {
            Some(Value::String(text.split_whitespace().collect()))
        }
        _ => None,
    };
    if let Some(normalized) = normalized {
        *value = normalized;
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "on" => Some(true),
            "0" | "false" | "f" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn parse_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
