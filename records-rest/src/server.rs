//! REST API server implementation

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::info;

use records_common::config::RecordsConfig;
use records_common::error::Result;

use crate::cache::create_cache;
use crate::db::{GenericDb, PoolExecutor, SqlExecutor};
use crate::definition::DefinitionService;
use crate::handlers::{self, RestState};
use crate::policy::{JoinLimits, Policies};
use crate::reflection::{ReflectionService, ReflectionSettings};
use crate::service::RecordService;

/// Record and column endpoints over one database
pub struct RestServer {
    config: RecordsConfig,
    pool: Option<Arc<PoolExecutor>>,
    state: Arc<RestState>,
}

impl RestServer {
    /// Connect to the configured database with join limits from the config
    ///
    /// # Errors
    /// Returns an error if the driver is unknown or the database is unreachable.
    pub async fn new(config: &RecordsConfig) -> Result<Self> {
        let policies = Policies {
            join_limits: JoinLimits::from(&config.join_limits),
            ..Policies::default()
        };
        Self::with_policies(config, policies).await
    }

    /// Connect to the configured database and apply `policies` to every request
    ///
    /// # Errors
    /// Returns an error if the driver is unknown or the database is unreachable.
    pub async fn with_policies(config: &RecordsConfig, policies: Policies) -> Result<Self> {
        let pool = Arc::new(PoolExecutor::connect(&config.database).await?);
        let mut server = Self::with_executor(config, pool.clone(), policies)?;
        server.pool = Some(pool);
        Ok(server)
    }

    /// Serve an already opened executor
    ///
    /// # Errors
    /// Returns a configuration error when no connection URL can be built.
    pub fn with_executor(
        config: &RecordsConfig,
        executor: Arc<dyn SqlExecutor>,
        policies: Policies,
    ) -> Result<Self> {
        let settings = ReflectionSettings::from_config(config)?;
        let cache = create_cache(&config.cache);
        let reflection = Arc::new(ReflectionService::new(executor.clone(), cache, settings));

        let db = GenericDb::new(executor.clone(), reflection.schema());
        let records = RecordService::new(db, reflection.clone(), policies);
        let definitions = DefinitionService::new(reflection, executor);

        Ok(Self {
            config: config.clone(),
            pool: None,
            state: Arc::new(RestState::new(records, definitions)),
        })
    }

    #[must_use]
    pub fn state(&self) -> Arc<RestState> {
        self.state.clone()
    }

    /// Register the routes on an app that carries `web::Data<Arc<RestState>>`
    pub fn configure(cfg: &mut web::ServiceConfig) {
        cfg.route("/health", web::get().to(handlers::health_handler))
            // Records
            .route("/records/{table}", web::get().to(handlers::list_handler))
            .route("/records/{table}", web::post().to(handlers::create_handler))
            .route("/records/{table}/{ids}", web::get().to(handlers::read_handler))
            .route("/records/{table}/{ids}", web::put().to(handlers::update_handler))
            .route("/records/{table}/{ids}", web::delete().to(handlers::delete_handler))
            .route("/records/{table}/{ids}", web::patch().to(handlers::increment_handler))
            // Definitions
            .route("/columns", web::get().to(handlers::read_database_handler))
            .route("/columns", web::post().to(handlers::create_table_handler))
            .route("/columns/{table}", web::get().to(handlers::read_table_handler))
            .route("/columns/{table}", web::put().to(handlers::rename_table_handler))
            .route("/columns/{table}", web::delete().to(handlers::remove_table_handler))
            .route("/columns/{table}", web::post().to(handlers::add_column_handler))
            .route("/columns/{table}/{column}", web::get().to(handlers::read_column_handler))
            .route("/columns/{table}/{column}", web::put().to(handlers::rename_column_handler))
            .route(
                "/columns/{table}/{column}",
                web::delete().to(handlers::remove_column_handler),
            );
    }

    /// Run the REST server
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn run(&self) -> Result<()> {
        let state = self.state.clone();
        let host = self.config.server.host.clone();
        let port = self.config.server.port;
        let workers = self.config.server.workers.max(1);

        info!("Starting records API server on {}:{}", host, port);
        info!("  Dialect: {}", self.state.records.db().dialect());

        HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(Cors::permissive())
                .wrap(middleware::Compress::default())
                .wrap(middleware::Logger::default())
                .configure(Self::configure)
                .default_service(web::to(handlers::not_found_handler))
        })
        .workers(workers)
        .bind(format!("{host}:{port}"))?
        .run()
        .await?;

        Ok(())
    }

    /// Close the connection pool
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
        info!("Records API server stopped");
    }
}
