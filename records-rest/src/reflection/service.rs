//! Lazily built, cached schema metadata

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use records_common::config::RecordsConfig;
use records_common::error::Result;

use super::column::ReflectedColumn;
use super::database::ReflectedDatabase;
use super::reflector::SchemaReflector;
use super::table::{ReflectedTable, TableKind};
use crate::cache::{fingerprint, Cache, NoCache};
use crate::db::SqlExecutor;

/// Reflection scope and caching options
#[derive(Debug, Clone, Default)]
pub struct ReflectionSettings {
    /// Schema to reflect; empty selects the dialect default
    pub schema: String,
    /// Allow-list of exposed tables; empty exposes all
    pub tables: Vec<String>,
    /// Prefix of every cache key, including the connection fingerprint
    pub cache_prefix: String,
    pub cache_ttl: Duration,
}

impl ReflectionSettings {
    /// Settings for the configured connection
    ///
    /// # Errors
    /// Returns a configuration error when no connection URL can be built.
    pub fn from_config(config: &RecordsConfig) -> Result<Self> {
        let url = config.database.connection_url()?;
        Ok(Self {
            schema: config.database.schema.clone(),
            tables: config.database.tables.clone(),
            cache_prefix: format!(
                "{}{}-",
                config.cache.prefix,
                fingerprint(&url, &config.database.schema)
            ),
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
        })
    }
}

/// Shared schema snapshot
///
/// The database listing and each table are reflected on first access and
/// published as immutable `Arc`s. Refreshing replaces the published values.
pub struct ReflectionService {
    reflector: SchemaReflector,
    cache: Arc<dyn Cache>,
    settings: ReflectionSettings,
    database: RwLock<Option<Arc<ReflectedDatabase>>>,
    tables: DashMap<String, Arc<ReflectedTable>>,
}

impl ReflectionService {
    #[must_use]
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        cache: Arc<dyn Cache>,
        settings: ReflectionSettings,
    ) -> Self {
        Self {
            reflector: SchemaReflector::new(executor, &settings.schema),
            cache,
            settings,
            database: RwLock::new(None),
            tables: DashMap::new(),
        }
    }

    /// Reflection without caching, exposing every table
    #[must_use]
    pub fn uncached(executor: Arc<dyn SqlExecutor>) -> Self {
        Self::new(executor, Arc::new(NoCache), ReflectionSettings::default())
    }

    /// Schema being reflected
    #[must_use]
    pub fn schema(&self) -> &str {
        self.reflector.schema()
    }

    /// The published database listing, reflected on first use
    ///
    /// # Errors
    /// Returns a database error when introspection fails.
    pub async fn database(&self) -> Result<Arc<ReflectedDatabase>> {
        let published = self.database.read().clone();
        if let Some(database) = published {
            return Ok(database);
        }
        let database = Arc::new(self.load_database(true).await?);
        *self.database.write() = Some(database.clone());
        Ok(database)
    }

    /// # Errors
    /// Returns a database error when introspection fails.
    pub async fn has_table(&self, name: &str) -> Result<bool> {
        Ok(self.database().await?.has_table(name))
    }

    /// # Errors
    /// Returns a database error when introspection fails.
    pub async fn table_kind(&self, name: &str) -> Result<Option<TableKind>> {
        Ok(self.database().await?.table_kind(name))
    }

    /// # Errors
    /// Returns a database error when introspection fails.
    pub async fn get_table_names(&self) -> Result<Vec<String>> {
        Ok(self.database().await?.table_names())
    }

    /// The reflected table, or `None` when the table is not exposed
    ///
    /// # Errors
    /// Returns a database error when introspection fails.
    pub async fn get_table(&self, name: &str) -> Result<Option<Arc<ReflectedTable>>> {
        let published = self.tables.get(name).map(|table| table.value().clone());
        if let Some(table) = published {
            return Ok(Some(table));
        }
        let Some(kind) = self.table_kind(name).await? else {
            return Ok(None);
        };
        let table = Arc::new(self.load_table(name, kind, true).await?);
        self.tables.insert(name.to_string(), table.clone());
        Ok(Some(table))
    }

    /// Reload the table listing and forget every reflected table
    ///
    /// # Errors
    /// Returns a database error when introspection fails.
    pub async fn refresh_tables(&self) -> Result<()> {
        self.cache.clear();
        let database = Arc::new(self.load_database(false).await?);
        *self.database.write() = Some(database);
        self.tables.clear();
        Ok(())
    }

    /// Reload one table, or forget it when it no longer exists
    ///
    /// # Errors
    /// Returns a database error when introspection fails.
    pub async fn refresh_table(&self, name: &str) -> Result<()> {
        match self.table_kind(name).await? {
            Some(kind) => {
                let table = Arc::new(self.load_table(name, kind, false).await?);
                self.tables.insert(name.to_string(), table);
            }
            None => {
                self.tables.remove(name);
            }
        }
        Ok(())
    }

    async fn load_database(&self, use_cache: bool) -> Result<ReflectedDatabase> {
        let key = format!("{}ReflectedDatabase", self.settings.cache_prefix);
        if use_cache {
            if let Some(database) = self.cached::<ReflectedDatabase>(&key) {
                return Ok(database);
            }
        }
        let listing = self.reflector.list_tables().await?;
        let database = ReflectedDatabase::from_listing(
            listing,
            self.reflector.ignored_tables(),
            &self.settings.tables,
        );
        info!(
            dialect = %self.reflector.dialect(),
            tables = database.len(),
            "Reflected database"
        );
        self.store(&key, &database);
        Ok(database)
    }

    async fn load_table(
        &self,
        name: &str,
        kind: TableKind,
        use_cache: bool,
    ) -> Result<ReflectedTable> {
        let key = format!("{}ReflectedTable({name})", self.settings.cache_prefix);
        if use_cache {
            if let Some(table) = self.cached::<ReflectedTable>(&key) {
                return Ok(table);
            }
        }

        let raw_columns = self.reflector.list_columns(name, kind).await?;
        let primary_keys = self.reflector.list_primary_keys(name).await?;
        let foreign_keys = self.reflector.list_foreign_keys(name).await?;
        let database = self.database().await?;

        let table_names = database.table_names();

        let dialect = self.reflector.dialect();
        let columns: Vec<ReflectedColumn> = raw_columns
            .iter()
            .map(|raw| {
                let mut column = ReflectedColumn::from_raw(dialect, raw);
                column.is_primary_key = primary_keys.contains(&column.name);
                if let Some(target) = foreign_keys.get(&column.name) {
                    column.foreign_key_target.clone_from(target);
                } else if kind == TableKind::View {
                    // views declare no keys; follow the `<table>_id` naming convention
                    if let Some(target) = view_reference(&table_names, &column.name) {
                        column.foreign_key_target = target;
                    }
                }
                column
            })
            .collect();

        let table = ReflectedTable::new(name, kind, columns);
        debug!(table = name, columns = table.column_names().len(), "Reflected table");
        self.store(&key, &table);
        Ok(table)
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.cache.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "Reflection cache hit");
                Some(value)
            }
            Err(error) => {
                warn!(key, error = %error, "Discarding unreadable cache entry");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.cache
                    .set(key, Bytes::from(bytes), self.settings.cache_ttl);
            }
            Err(error) => warn!(key, error = %error, "Failed to serialize cache entry"),
        }
    }
}

/// Table referenced by a view column named `..<table>_id`; the longest
/// matching table name wins
fn view_reference(table_names: &[String], column: &str) -> Option<String> {
    let stem = column.strip_suffix("_id")?;
    table_names
        .iter()
        .filter(|table| stem.ends_with(table.as_str()))
        .max_by_key(|table| table.len())
        .cloned()
}
