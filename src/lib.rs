//! Records API
//!
//! Serves every table of a MySQL, PostgreSQL or SQLite database as a REST
//! resource. Tables and relationships are discovered by reflecting the
//! schema at runtime.
//!
//! # Features
//!
//! - **Records** - list, read, create, update, delete and increment
//! - **Filters** - nestable AND/OR groups over column and spatial predicates
//! - **Joins** - belongs-to, has-many and many-to-many through junction tables
//! - **Definitions** - create, rename and drop tables and columns
//! - **Policies** - table/column visibility, row conditions and tenant pinning

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use records_common as common;
pub use records_rest as rest;

use tracing::info;

use records_common::config::RecordsConfig;
use records_common::error::Result;
use records_rest::{Policies, RestServer};

/// Main records API server
pub struct RecordsServer {
    config: RecordsConfig,
    rest_server: RestServer,
}

impl RecordsServer {
    /// Create a server for the configured database
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn new(config: RecordsConfig) -> Result<Self> {
        info!("Initializing records API");
        let rest_server = RestServer::new(&config).await?;
        Ok(Self {
            config,
            rest_server,
        })
    }

    /// Create a server that applies `policies` to every request
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn with_policies(config: RecordsConfig, policies: Policies) -> Result<Self> {
        let rest_server = RestServer::with_policies(&config, policies).await?;
        Ok(Self {
            config,
            rest_server,
        })
    }

    #[must_use]
    pub fn rest(&self) -> &RestServer {
        &self.rest_server
    }

    #[must_use]
    pub fn config(&self) -> &RecordsConfig {
        &self.config
    }

    /// Serve requests until the server stops
    ///
    /// # Errors
    /// Returns an error if the REST server fails to start.
    pub async fn run(&self) -> Result<()> {
        info!(
            "  - Records: http://{}:{}/records",
            self.config.server.host, self.config.server.port
        );
        info!(
            "  - Columns: http://{}:{}/columns",
            self.config.server.host, self.config.server.port
        );
        self.rest_server.run().await
    }

    /// Shut down and release the database pool
    pub async fn shutdown(&self) {
        info!("Shutting down records API");
        self.rest_server.shutdown().await;
    }
}
