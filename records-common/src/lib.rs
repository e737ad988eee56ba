//! Records API Common Types and Utilities
//!
//! Shared configuration, error handling and response types for the records API.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::RecordsConfig;
pub use error::{Error, Result};
