//! Traits for database operations
//!
//! This module contains the traits that define how entities are described
//! and which operations a store offers.

pub mod core;
pub mod relation;
pub mod table_metadata;

pub use self::core::Store;
pub use relation::RelationLoader;
pub use table_metadata::TableMetadata;
