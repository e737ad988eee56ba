//! Reflected schema model
//!
//! Tables, columns and keys are introspected from the live database,
//! normalized to portable types and published as immutable snapshots.

pub mod column;
pub mod database;
pub mod reflector;
pub mod service;
pub mod table;
pub mod types;
pub mod view;

pub use column::ReflectedColumn;
pub use database::ReflectedDatabase;
pub use reflector::{RawColumn, SchemaReflector};
pub use service::{ReflectionService, ReflectionSettings};
pub use table::{ReflectedTable, TableKind};
pub use types::{LogicalType, NativeType, TypeConverter};
pub use view::SchemaView;
