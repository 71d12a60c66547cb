//! Convenience re-exports for common StoreKit usage
//!
//! # Example
//!
//! ```rust
//! use storekit::prelude::*;
//!
//! let options = ListOptions::new().sort_by("created_at", SortOrder::Desc);
//! assert_eq!(options.sort.len(), 1);
//! ```

// Core StoreKit components
pub use crate::contact::{Contact, ContactRequest};
pub use crate::core::{HealthCheckResult, StoreKit};
pub use crate::errors::StoreKitError;

// Re-export centralized config
pub use config::{AppConfig, DatabaseConfig, PaginationConfig};

// Re-export commonly used store-object types for convenience
pub use store_object::prelude::*;

// Re-export store_object module for macro-generated code
pub use store_object;

// Re-export table derive for entity definitions
pub use table_derive::{TableMetadata, entity};

// Common external dependencies
pub use anyhow;
pub use async_trait;
pub use sqlx;
pub use tokio;

// Commonly used sqlx types
pub use sqlx::{Postgres, Row, Transaction};
