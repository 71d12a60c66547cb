//! Convenience re-exports for common store-object usage

// Core traits
pub use crate::traits::{RelationLoader, Store, TableMetadata};
pub use crate::model::{Entity, Id, Model};

// Error types
pub use crate::errors::{ErrorKind, StoreError};

// Core store functionality
pub use crate::connection::Connection;
pub use crate::generic_store::{attach_relation, GenericStore};

// Listing
pub use crate::pagination::{ListOptions, PageLimits};
pub use crate::query_builder::{QueryFilter, SortOrder};
pub use crate::response::ListResponse;

// Common external dependencies that are frequently used
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use sqlx::{FromRow, PgPool};
pub use uuid::Uuid;
