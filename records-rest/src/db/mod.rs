//! Dialect-aware database access
//!
//! SQL is generated per dialect and executed through the [`SqlExecutor`]
//! seam, which production code backs with a pooled sqlx `Any` connection.

pub mod access;
pub mod builder;
pub mod definition;
pub mod dialect;
pub mod errors;
pub mod executor;
pub mod pool;
pub mod value;

pub use access::GenericDb;
pub use builder::ColumnsBuilder;
pub use definition::GenericDefinition;
pub use dialect::Dialect;
pub use executor::{ExecuteResult, SqlExecutor};
pub use pool::{PoolExecutor, PoolSettings};
pub use value::{Arguments, SqlValue, ValueConverter};

#[cfg(test)]
pub(crate) use executor::testing;
