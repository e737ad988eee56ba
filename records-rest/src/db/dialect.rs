//! SQL dialect differences between the supported engines

use std::fmt;

use records_common::error::{Error, Result};

/// Database engine a connection talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
    SqlServer,
    Sqlite,
}

impl Dialect {
    /// Resolve a configured driver name
    ///
    /// # Errors
    /// Returns a configuration error for an unknown driver.
    pub fn from_driver(driver: &str) -> Result<Self> {
        match driver.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlsrv" | "mssql" => Ok(Self::SqlServer),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(Error::ConfigError(format!("Unknown driver: {other}"))),
        }
    }

    /// Driver name as used in configuration
    #[must_use]
    pub fn driver(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "pgsql",
            Self::SqlServer => "sqlsrv",
            Self::Sqlite => "sqlite",
        }
    }

    /// Schema reflected when none is configured
    #[must_use]
    pub fn default_schema(self) -> &'static str {
        match self {
            Self::Postgres => "public",
            Self::SqlServer => "dbo",
            Self::MySql | Self::Sqlite => "",
        }
    }

    /// Quote an identifier
    #[must_use]
    pub fn quote(self, identifier: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", identifier.replace('`', "``")),
            Self::Postgres | Self::SqlServer | Self::Sqlite => {
                format!("\"{}\"", identifier.replace('"', "\"\""))
            }
        }
    }

    /// Positional placeholder for the 1-based argument `index`
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::MySql | Self::Sqlite => "?".to_string(),
            Self::Postgres => format!("${index}"),
            Self::SqlServer => format!("@p{index}"),
        }
    }

    /// Predicate that never matches
    #[must_use]
    pub fn false_literal(self) -> &'static str {
        match self {
            Self::SqlServer => "1=0",
            Self::MySql | Self::Postgres | Self::Sqlite => "FALSE",
        }
    }

    /// Suffix declaring the backslash as LIKE escape character
    #[must_use]
    pub fn like_escape(self) -> &'static str {
        match self {
            Self::Sqlite | Self::SqlServer => " ESCAPE '\\'",
            Self::MySql | Self::Postgres => "",
        }
    }

    /// Row window clause; SQL Server requires an ORDER BY before it
    #[must_use]
    pub fn limit_clause(self, offset: u64, limit: Option<u64>) -> String {
        match (self, limit) {
            (_, None) if offset == 0 => String::new(),
            (Self::SqlServer, Some(limit)) => {
                format!(" OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
            }
            (Self::SqlServer, None) => format!(" OFFSET {offset} ROWS"),
            (_, Some(limit)) => format!(" LIMIT {limit} OFFSET {offset}"),
            (Self::Sqlite, None) => format!(" LIMIT -1 OFFSET {offset}"),
            (Self::MySql, None) => format!(" LIMIT 18446744073709551615 OFFSET {offset}"),
            (Self::Postgres, None) => format!(" OFFSET {offset}"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver())
    }
}

/// Escape the LIKE wildcards of a literal pattern fragment
#[must_use]
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
