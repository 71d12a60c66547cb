use crate::connection::Connection;
use crate::errors::StoreError;
use async_trait::async_trait;

/// Eager loading of named relations for one entity type
///
/// A loader dispatches on the relation name and usually delegates to
/// [`attach_relation`](crate::generic_store::relation::attach_relation) with
/// the related store's `list_by_ids`. The connection is the one the listing
/// ran on, so relations load inside the same transaction.
#[async_trait]
pub trait RelationLoader<T>: Send + Sync {
    async fn attach(
        &self,
        conn: &Connection,
        results: &mut [T],
        relation: &str,
    ) -> Result<(), StoreError>;
}
