//! Store Object - Core data-access layer for StoreKit
//!
//! This crate provides the connection handles, entity contract, query
//! builder, listing options and the generic store every entity type shares.

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;

pub mod connection;
pub mod errors;
pub mod generic_store;
pub mod model;
pub mod pagination;
pub mod prelude;
pub mod query_builder;
pub mod response;
pub mod traits;
pub mod validation;

pub use connection::Connection;
pub use errors::{ErrorKind, StoreError};
pub use generic_store::{attach_relation, GenericStore};
pub use model::{Entity, Id, Model};
pub use pagination::{ListOptions, PageLimits};
pub use query_builder::{QueryBuilder, QueryFilter, QueryOperator, SortOrder};
pub use response::ListResponse;
pub use traits::{RelationLoader, Store, TableMetadata};

// Used by code generated from `#[derive(TableMetadata)]`
pub use serde_json;
pub use sqlx;
