//! Batched eager loading of foreign-key relations

use crate::errors::StoreError;
use crate::model::{Entity, Id};
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// Attach related entities to a page of results with a single batch fetch
///
/// `foreign_key` reads the relation id of each row (`None` or `0` means no
/// relation), `fetch` loads related rows by id (normally the related store's
/// `list_by_ids`) and `attach` stores a match on the row. Rows whose key has
/// no match are left untouched. Nothing is fetched when no row has a key.
pub async fn attach_relation<T, R, K, A, F, Fut>(
    results: &mut [T],
    foreign_key: K,
    attach: A,
    fetch: F,
) -> Result<(), StoreError>
where
    R: Entity + Clone,
    K: Fn(&T) -> Option<Id>,
    A: Fn(&mut T, R),
    F: FnOnce(Vec<Id>) -> Fut,
    Fut: Future<Output = Result<Vec<R>, StoreError>>,
{
    let mut seen = HashSet::new();
    let ids: Vec<Id> = results
        .iter()
        .filter_map(|row| foreign_key(row))
        .filter(|id| *id != 0 && seen.insert(*id))
        .collect();
    if ids.is_empty() {
        return Ok(());
    }

    let related: HashMap<Id, R> = fetch(ids)
        .await?
        .into_iter()
        .map(|entity| (entity.id(), entity))
        .collect();

    for row in results.iter_mut() {
        if let Some(entity) = foreign_key(row).and_then(|id| related.get(&id)) {
            attach(row, entity.clone());
        }
    }
    Ok(())
}
