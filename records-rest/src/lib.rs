//! Records REST API Service
//!
//! Exposes every table of a relational database as a REST resource,
//! driven entirely by the reflected schema:
//! - Schema reflection for MySQL, PostgreSQL, SQL Server and SQLite
//! - Filtering with nestable AND/OR groups, including spatial predicates
//! - Column selection, ordering and pagination
//! - Relationship joins (belongs-to, has-many, has-and-belongs-to-many)
//! - Create, read, update, delete and increment of single records
//! - Table and column definition management

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod cache;
pub mod columns;
pub mod condition;
pub mod db;
pub mod definition;
pub mod handlers;
pub mod joiner;
pub mod ordering;
pub mod pagination;
pub mod params;
pub mod path_tree;
pub mod policy;
pub mod reflection;
pub mod server;
pub mod service;

pub use cache::{Cache, MemoryCache, NoCache};
pub use condition::Condition;
pub use db::{Dialect, GenericDb, PoolExecutor, SqlExecutor};
pub use definition::DefinitionService;
pub use params::QueryParams;
pub use policy::{Authorization, JoinLimits, MultiTenancy, Operation, Policies};
pub use reflection::{
    LogicalType, ReflectedColumn, ReflectedDatabase, ReflectedTable, ReflectionService, TableKind,
};
pub use handlers::RestState;
pub use server::RestServer;
pub use service::RecordService;
