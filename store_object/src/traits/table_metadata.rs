//! Table metadata trait
//!
//! Describes how an entity maps onto its table. Implementations are
//! generated by `#[derive(TableMetadata)]`; the generic store only ever talks
//! to entities through this trait.

use crate::model::{Entity, Id, BASE_COLUMNS};
use chrono::{DateTime, Utc};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArguments, PgRow, PgTypeInfo};
use sqlx::{Postgres, Type};
use std::fmt::Debug;
use uuid::Uuid;

/// Metadata about an entity's table
///
/// Recommended usage:
/// ```ignore
/// use store_object::prelude::*;
///
/// #[derive(Debug, Clone, sqlx::FromRow, TableMetadata)]
/// #[table(name = "contacts")]
/// pub struct Contact {
///     #[model]
///     #[sqlx(flatten)]
///     pub model: Model,
///
///     #[field(create, update)]
///     pub email: String,
///
///     #[field(create)]
///     pub tag: String,
/// }
/// ```
pub trait TableMetadata:
    Entity + Clone + Send + Sync + Debug + Unpin + for<'r> sqlx::FromRow<'r, PgRow> + 'static
{
    /// The table name in the database
    fn table_name() -> &'static str;

    /// Entity columns written on insert, in bind order (base columns excluded)
    fn create_fields() -> &'static [&'static str];

    /// Entity columns rewritten on update, in bind order (base columns excluded)
    fn update_fields() -> &'static [&'static str];

    /// Relation names that may be requested through `ListOptions::include`
    fn relations() -> &'static [&'static str] {
        &[]
    }

    /// Bind the values of [`TableMetadata::create_fields`] in order
    fn bind_create_params(&self, args: &mut PgArguments) -> Result<(), BoxDynError>;

    /// Bind the values of [`TableMetadata::update_fields`] in order
    fn bind_update_params(&self, args: &mut PgArguments) -> Result<(), BoxDynError>;

    /// Value of a column as JSON, used to build pagination cursors
    fn column_value(&self, column: &str) -> Option<serde_json::Value>;

    /// PostgreSQL type of an entity column (base columns excluded)
    ///
    /// Predicate values are cast to it, so a text column compares as text
    /// whatever its values look like.
    fn column_type(column: &str) -> Option<PgTypeInfo>;

    /// Every column that may be filtered or sorted on
    fn all_columns() -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = BASE_COLUMNS.to_vec();
        for field in Self::create_fields().iter().chain(Self::update_fields()) {
            if !columns.contains(field) {
                columns.push(field);
            }
        }
        columns
    }
}

/// PostgreSQL type of a base column
pub fn base_column_type(column: &str) -> Option<PgTypeInfo> {
    match column {
        "id" => Some(<Id as Type<Postgres>>::type_info()),
        "external_id" => Some(<Uuid as Type<Postgres>>::type_info()),
        "created_at" | "updated_at" => Some(<DateTime<Utc> as Type<Postgres>>::type_info()),
        _ => None,
    }
}

/// JSON value of a base column, shared by generated `column_value` impls
pub fn base_column_value<T: Entity + ?Sized>(entity: &T, column: &str) -> Option<serde_json::Value> {
    let model = entity.model();
    match column {
        "id" => Some(serde_json::Value::from(model.id)),
        "external_id" => Some(serde_json::Value::String(model.external_id.to_string())),
        "created_at" => Some(serde_json::Value::String(model.created_at.to_rfc3339())),
        "updated_at" => Some(serde_json::Value::String(model.updated_at.to_rfc3339())),
        _ => None,
    }
}
