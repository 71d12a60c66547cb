//! Trait definitions
//!
//! This module defines the operation set every entity store offers.

use crate::errors::StoreError;
use crate::model::Id;
use crate::pagination::ListOptions;
use crate::response::ListResponse;
use async_trait::async_trait;
use uuid::Uuid;

/// Common database operations for one entity type
#[async_trait]
pub trait Store: Send + Sync {
    /// The entity this store persists
    type Model: Send + Sync;

    /// Fetch by internal identifier
    async fn get(&self, id: Id) -> Result<Self::Model, StoreError>;

    /// Fetch by external identifier
    async fn get_by_external_id(&self, external_id: Uuid) -> Result<Self::Model, StoreError>;

    /// One page of entities matching the options
    async fn list(&self, options: ListOptions) -> Result<ListResponse<Self::Model>, StoreError>;

    /// One page of entities whose relation key equals `id`
    async fn list_by_relation_id(
        &self,
        id: Id,
        options: ListOptions,
    ) -> Result<ListResponse<Self::Model>, StoreError>;

    /// Batch fetch, in no particular order
    async fn list_by_ids(&self, ids: &[Id]) -> Result<Vec<Self::Model>, StoreError>;

    /// Number of entities matching the options' filters
    async fn count(&self, options: ListOptions) -> Result<i64, StoreError>;

    /// Insert a new row and fill in the store-managed fields
    async fn save(&self, entity: &mut Self::Model) -> Result<(), StoreError>;

    /// Update the row with the entity's id
    async fn update(&self, entity: &mut Self::Model) -> Result<(), StoreError>;

    /// Delete by internal identifier
    async fn delete(&self, id: Id) -> Result<(), StoreError>;

    /// Delete by external identifier
    async fn delete_by_external_id(&self, external_id: Uuid) -> Result<(), StoreError>;
}
