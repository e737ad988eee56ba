//! Mapping between native column types and the portable logical type set

use serde::{Deserialize, Serialize};

use crate::db::Dialect;

/// Portable column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Integer,
    Bigint,
    Varchar,
    Clob,
    Decimal,
    Float,
    Double,
    Boolean,
    Date,
    Time,
    Timestamp,
    Blob,
    Varbinary,
    Geometry,
}

impl LogicalType {
    pub const DEFAULT_LENGTH: u32 = 255;
    pub const DEFAULT_PRECISION: u32 = 19;
    pub const DEFAULT_SCALE: u32 = 4;

    /// Parse a logical type name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let logical = match name.to_lowercase().as_str() {
            "integer" => Self::Integer,
            "bigint" => Self::Bigint,
            "varchar" => Self::Varchar,
            "clob" => Self::Clob,
            "decimal" => Self::Decimal,
            "float" => Self::Float,
            "double" => Self::Double,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "time" => Self::Time,
            "timestamp" => Self::Timestamp,
            "blob" => Self::Blob,
            "varbinary" => Self::Varbinary,
            "geometry" => Self::Geometry,
            _ => return None,
        };
        Some(logical)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Bigint => "bigint",
            Self::Varchar => "varchar",
            Self::Clob => "clob",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Blob => "blob",
            Self::Varbinary => "varbinary",
            Self::Geometry => "geometry",
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Integer | Self::Bigint)
    }

    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Types that support arithmetic increments
    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_floating() || self == Self::Decimal
    }

    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Blob | Self::Varbinary)
    }

    #[must_use]
    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::Timestamp)
    }

    #[must_use]
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Varchar | Self::Clob)
    }

    /// Whether a length is part of the type
    #[must_use]
    pub fn has_length(self) -> bool {
        matches!(self, Self::Varchar | Self::Varbinary)
    }

    /// Whether precision and scale are part of the type
    #[must_use]
    pub fn has_precision(self) -> bool {
        self == Self::Decimal
    }
}

/// Converts between native and logical types for one dialect
#[derive(Debug, Clone, Copy)]
pub struct TypeConverter {
    dialect: Dialect,
}

impl TypeConverter {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Map a native type name (without length arguments) to its logical type
    ///
    /// Unknown types map to `Clob`.
    #[must_use]
    pub fn to_logical(&self, native: &str) -> LogicalType {
        let native = native.trim().to_lowercase();
        if let Some(logical) = self.dialect_specific(&native) {
            return logical;
        }
        match native.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "int2" | "int4"
            | "serial" | "serial4" | "smallserial" | "serial2" | "year" => LogicalType::Integer,
            "bigint" | "int8" | "bigserial" | "serial8" => LogicalType::Bigint,
            "varchar" | "character varying" | "nvarchar" | "char" | "character" | "nchar"
            | "bpchar" | "uuid" | "uniqueidentifier" | "enum" | "set" | "citext" | "name"
            | "inet" | "cidr" | "macaddr" => LogicalType::Varchar,
            "text" | "tinytext" | "mediumtext" | "longtext" | "ntext" | "clob" | "json"
            | "jsonb" | "xml" | "interval" => LogicalType::Clob,
            "decimal" | "numeric" | "dec" | "money" | "smallmoney" => LogicalType::Decimal,
            "float" | "real" | "float4" => LogicalType::Float,
            "double" | "double precision" | "float8" => LogicalType::Double,
            "boolean" | "bool" | "bit" => LogicalType::Boolean,
            "date" => LogicalType::Date,
            "time" | "timetz" | "time with time zone" | "time without time zone" => {
                LogicalType::Time
            }
            "timestamp" | "timestamptz" | "datetime" | "datetime2" | "smalldatetime"
            | "datetimeoffset" | "timestamp with time zone" | "timestamp without time zone" => {
                LogicalType::Timestamp
            }
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "bytea" | "image" => {
                LogicalType::Blob
            }
            "binary" | "varbinary" | "rowversion" => LogicalType::Varbinary,
            "geometry" | "geography" | "point" | "linestring" | "polygon" | "multipoint"
            | "multilinestring" | "multipolygon" | "geometrycollection" => LogicalType::Geometry,
            _ if self.dialect == Dialect::Sqlite => Self::sqlite_affinity(&native),
            _ => LogicalType::Clob,
        }
    }

    fn dialect_specific(&self, native: &str) -> Option<LogicalType> {
        match (self.dialect, native) {
            (Dialect::MySql | Dialect::Sqlite, "real") => Some(LogicalType::Double),
            (Dialect::SqlServer, "float") => Some(LogicalType::Double),
            (Dialect::SqlServer, "timestamp") => Some(LogicalType::Varbinary),
            (Dialect::Sqlite, "") => Some(LogicalType::Clob),
            _ => None,
        }
    }

    /// SQLite accepts any declared type; resolve it the way SQLite assigns affinity
    fn sqlite_affinity(native: &str) -> LogicalType {
        if native.contains("int") {
            LogicalType::Integer
        } else if native.contains("char") {
            LogicalType::Varchar
        } else if native.contains("clob") || native.contains("text") {
            LogicalType::Clob
        } else if native.contains("blob") {
            LogicalType::Blob
        } else if native.contains("real") || native.contains("floa") || native.contains("doub")
        {
            LogicalType::Double
        } else {
            LogicalType::Clob
        }
    }

    /// Native type name used to declare or cast to a logical type
    #[must_use]
    pub fn to_native(&self, logical: LogicalType) -> &'static str {
        match self.dialect {
            Dialect::Postgres => match logical {
                LogicalType::Integer => "integer",
                LogicalType::Bigint => "bigint",
                LogicalType::Varchar => "varchar",
                LogicalType::Clob => "text",
                LogicalType::Decimal => "numeric",
                LogicalType::Float => "real",
                LogicalType::Double => "double precision",
                LogicalType::Boolean => "boolean",
                LogicalType::Date => "date",
                LogicalType::Time => "time",
                LogicalType::Timestamp => "timestamp",
                LogicalType::Blob | LogicalType::Varbinary => "bytea",
                LogicalType::Geometry => "geometry",
            },
            Dialect::MySql => match logical {
                LogicalType::Integer => "int",
                LogicalType::Bigint => "bigint",
                LogicalType::Varchar => "varchar",
                LogicalType::Clob => "longtext",
                LogicalType::Decimal => "decimal",
                LogicalType::Float => "float",
                LogicalType::Double => "double",
                LogicalType::Boolean => "tinyint(1)",
                LogicalType::Date => "date",
                LogicalType::Time => "time",
                LogicalType::Timestamp => "datetime",
                LogicalType::Blob => "longblob",
                LogicalType::Varbinary => "varbinary",
                LogicalType::Geometry => "geometry",
            },
            Dialect::SqlServer => match logical {
                LogicalType::Integer => "int",
                LogicalType::Bigint => "bigint",
                LogicalType::Varchar => "nvarchar",
                LogicalType::Clob => "ntext",
                LogicalType::Decimal => "decimal",
                LogicalType::Float => "real",
                LogicalType::Double => "float",
                LogicalType::Boolean => "bit",
                LogicalType::Date => "date",
                LogicalType::Time => "time",
                LogicalType::Timestamp => "datetime2",
                LogicalType::Blob => "image",
                LogicalType::Varbinary => "varbinary",
                LogicalType::Geometry => "geometry",
            },
            Dialect::Sqlite => match logical {
                LogicalType::Integer | LogicalType::Bigint => "integer",
                LogicalType::Varchar => "varchar",
                LogicalType::Clob => "text",
                LogicalType::Decimal => "decimal",
                LogicalType::Float => "float",
                LogicalType::Double => "double",
                LogicalType::Boolean => "boolean",
                LogicalType::Date => "date",
                LogicalType::Time => "time",
                LogicalType::Timestamp => "datetime",
                LogicalType::Blob => "blob",
                LogicalType::Varbinary => "varbinary",
                LogicalType::Geometry => "geometry",
            },
        }
    }
}

/// A native type split into its base name and numeric arguments
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeType {
    pub base: String,
    pub arguments: Vec<u32>,
}

impl NativeType {
    /// Split `decimal(10,2) unsigned` into `decimal` and `[10, 2]`
    ///
    /// Non-numeric arguments such as `max` are dropped.
    #[must_use]
    pub fn parse(declared: &str) -> Self {
        let declared = declared.trim().to_lowercase();
        match declared.find('(') {
            Some(open) => {
                let close = declared[open..].find(')').map_or(declared.len(), |i| open + i);
                let arguments = declared[open + 1..close]
                    .split(',')
                    .filter_map(|part| part.trim().parse().ok())
                    .collect();
                Self {
                    base: declared[..open].trim().to_string(),
                    arguments,
                }
            }
            None => Self {
                base: declared
                    .trim_end_matches(" unsigned")
                    .trim_end_matches(" zerofill")
                    .to_string(),
                arguments: vec![],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_mappings() {
        let converter = TypeConverter::new(Dialect::Postgres);
        assert_eq!(converter.to_logical("int4"), LogicalType::Integer);
        assert_eq!(converter.to_logical("character varying"), LogicalType::Varchar);
        assert_eq!(converter.to_logical("numeric"), LogicalType::Decimal);
        assert_eq!(converter.to_logical("bytea"), LogicalType::Blob);
        assert_eq!(converter.to_logical("timestamp with time zone"), LogicalType::Timestamp);
        assert_eq!(converter.to_logical("geometry"), LogicalType::Geometry);
    }

    #[test]
    fn test_unknown_type_is_clob() {
        let converter = TypeConverter::new(Dialect::MySql);
        assert_eq!(converter.to_logical("hstore_like"), LogicalType::Clob);
    }

    #[test]
    fn test_dialect_specific_mappings() {
        assert_eq!(
            TypeConverter::new(Dialect::SqlServer).to_logical("float"),
            LogicalType::Double
        );
        assert_eq!(
            TypeConverter::new(Dialect::SqlServer).to_logical("timestamp"),
            LogicalType::Varbinary
        );
        assert_eq!(
            TypeConverter::new(Dialect::MySql).to_logical("real"),
            LogicalType::Double
        );
        assert_eq!(
            TypeConverter::new(Dialect::Postgres).to_logical("real"),
            LogicalType::Float
        );
    }

    #[test]
    fn test_sqlite_affinity() {
        let converter = TypeConverter::new(Dialect::Sqlite);
        assert_eq!(converter.to_logical("UNSIGNED BIG INT"), LogicalType::Integer);
        assert_eq!(converter.to_logical("NATIVE CHARACTER"), LogicalType::Varchar);
        assert_eq!(converter.to_logical(""), LogicalType::Clob);
    }

    #[test]
    fn test_round_trip_through_native() {
        for dialect in [Dialect::MySql, Dialect::Postgres, Dialect::SqlServer] {
            let converter = TypeConverter::new(dialect);
            for logical in [
                LogicalType::Bigint,
                LogicalType::Varchar,
                LogicalType::Decimal,
                LogicalType::Double,
                LogicalType::Date,
                LogicalType::Geometry,
            ] {
                let native = NativeType::parse(converter.to_native(logical));
                assert_eq!(converter.to_logical(&native.base), logical, "{dialect}");
            }
        }
    }

    #[test]
    fn test_parse_native_type() {
        assert_eq!(
            NativeType::parse("decimal(10, 2)"),
            NativeType {
                base: "decimal".to_string(),
                arguments: vec![10, 2]
            }
        );
        assert_eq!(NativeType::parse("varchar(max)").arguments, Vec::<u32>::new());
        assert_eq!(NativeType::parse("INT UNSIGNED").base, "int");
        assert_eq!(NativeType::parse("tinyint(1)").arguments, vec![1]);
    }

    #[test]
    fn test_logical_type_serde() {
        let json = serde_json::to_string(&LogicalType::Varbinary).unwrap();
        assert_eq!(json, "\"varbinary\"");
        assert_eq!(LogicalType::from_name("GEOMETRY"), Some(LogicalType::Geometry));
        assert_eq!(LogicalType::from_name("nope"), None);
    }
}
