//! Configuration types for the records API

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration for the records API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Database connection configuration
    pub database: DatabaseConfig,
    /// Reflection cache configuration
    pub cache: CacheConfig,
    /// Limits applied to relationship joins
    pub join_limits: JoinLimitsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port for the REST API (default: 8080)
    pub port: u16,
    /// Number of HTTP workers (0 = one per core)
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: 0,
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Driver name: `mysql`, `pgsql`, `sqlsrv` or `sqlite`
    pub driver: String,
    /// Full connection URL; overrides the individual fields when set
    pub url: Option<String>,
    /// Database host
    pub host: String,
    /// Database port (0 = driver default)
    pub port: u16,
    /// Database name, or file path for sqlite
    pub database: String,
    /// Database user
    pub username: String,
    /// Database password
    pub password: String,
    /// Schema (namespace) to reflect; empty = driver default
    pub schema: String,
    /// Tables to expose; empty exposes every table
    pub tables: Vec<String>,
    /// Connection pool size
    pub pool_size: u32,
    /// Maximum time to wait for a pooled connection
    pub acquire_timeout_ms: u64,
    /// Maximum time a single statement may run
    pub query_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            url: None,
            host: "localhost".to_string(),
            port: 0,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            schema: String::new(),
            tables: vec![],
            pool_size: 10,
            acquire_timeout_ms: 5_000,
            query_timeout_ms: 30_000,
        }
    }
}

impl DatabaseConfig {
    /// Default port for the configured driver
    #[must_use]
    pub fn default_port(&self) -> u16 {
        match self.driver.as_str() {
            "pgsql" => 5432,
            "sqlsrv" => 1433,
            "sqlite" => 0,
            _ => 3306,
        }
    }

    /// Build the connection URL from the configured fields
    ///
    /// # Errors
    /// Returns a configuration error for an unknown driver.
    pub fn connection_url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let scheme = match self.driver.as_str() {
            "mysql" => "mysql",
            "pgsql" => "postgres",
            "sqlsrv" => "mssql",
            "sqlite" => {
                return Ok(if self.database.is_empty() || self.database == ":memory:" {
                    "sqlite::memory:".to_string()
                } else {
                    format!("sqlite://{}?mode=rwc", self.database)
                });
            }
            other => {
                return Err(Error::ConfigError(format!("Unknown driver: {other}")));
            }
        };

        let port = if self.port == 0 {
            self.default_port()
        } else {
            self.port
        };

        let credentials = if self.username.is_empty() {
            String::new()
        } else if self.password.is_empty() {
            format!("{}@", encode_userinfo(&self.username))
        } else {
            format!(
                "{}:{}@",
                encode_userinfo(&self.username),
                encode_userinfo(&self.password)
            )
        };

        Ok(format!(
            "{scheme}://{credentials}{}:{port}/{}",
            self.host, self.database
        ))
    }
}

/// Percent-encode the characters that would break the userinfo part of a URL
fn encode_userinfo(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => encoded.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

/// Reflection cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache reflected schema metadata in memory
    pub enabled: bool,
    /// Time-to-live of cached entries in seconds
    pub ttl_secs: u64,
    /// Prefix for every cache key
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 10,
            prefix: "records-api-".to_string(),
        }
    }
}

/// Limits applied to relationship joins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinLimitsConfig {
    /// Maximum length of one join path
    pub depth: usize,
    /// Maximum number of joined tables per request
    pub tables: usize,
    /// Maximum number of records fetched per join
    pub records: usize,
}

impl Default for JoinLimitsConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            tables: 10,
            records: 1000,
        }
    }
}
