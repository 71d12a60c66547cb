//! Base fields shared by every stored entity
//!
//! Each entity embeds a [`Model`] holding its store-managed identity and
//! timestamps, and exposes it through the [`Entity`] capability.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned internal identifier
pub type Id = i64;

/// Columns every table carries, in the order the store writes them
pub const BASE_COLUMNS: [&str; 4] = ["id", "external_id", "created_at", "updated_at"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Model {
    pub id: Id,
    pub external_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Unsaved model with a fresh external id
    pub fn new() -> Self {
        Self::with_external_id(Uuid::new_v4())
    }

    pub fn with_external_id(external_id: Uuid) -> Self {
        Self {
            id: 0,
            external_id,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id > 0
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

/// Current time at the precision PostgreSQL keeps for `timestamptz`
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Capability every stored entity implements
///
/// Normally derived through `#[derive(TableMetadata)]` on a struct with a
/// `#[model]` field.
pub trait Entity {
    fn model(&self) -> &Model;

    fn model_mut(&mut self) -> &mut Model;

    fn id(&self) -> Id {
        self.model().id
    }

    fn set_id(&mut self, id: Id) {
        self.model_mut().id = id;
    }

    fn external_id(&self) -> Uuid {
        self.model().external_id
    }

    /// Set the external id once; a non-nil value is never overwritten
    fn set_external_id(&mut self, external_id: Uuid) {
        let model = self.model_mut();
        if model.external_id.is_nil() {
            model.external_id = external_id;
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.model().created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.model().updated_at
    }
}

impl Entity for Model {
    fn model(&self) -> &Model {
        self
    }

    fn model_mut(&mut self) -> &mut Model {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_is_unsaved_with_external_id() {
        let model = Model::new();
        assert!(!model.is_saved());
        assert!(!model.external_id.is_nil());
    }

    #[test]
    fn external_id_is_immutable_once_set() {
        let mut model = Model::with_external_id(Uuid::nil());
        let first = Uuid::new_v4();
        model.set_external_id(first);
        model.set_external_id(Uuid::new_v4());
        assert_eq!(model.external_id(), first);
    }

    #[test]
    fn now_is_truncated_to_micros() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }
}
