//! Parsing and validation of `kiln.toml` cache configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`KilnConfig`] selecting the cache mode, the key derivation strategy, and
//! the capacity of the generational cache.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str};
pub use types::*;
