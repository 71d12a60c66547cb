//! Error types for the StoreKit crate
//!
//! Store operations return [`StoreError`]; this enum covers bootstrap and the
//! store registry on top of it.

use config::ConfigError;
use store_object::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreKitError {
    #[error("Database unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store object not found: {0}")]
    StoreNotFound(String),

    #[error("Store object already registered: {0}")]
    StoreAlreadyRegistered(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
