//! Generic store implementations
//!
//! Every operation validates its input, renders SQL from the cached
//! [`TableSchema`](super::core::TableSchema) and the query builder, and runs it
//! on the store's connection handle.

use super::core::GenericStore;
use crate::connection::Statement;
use crate::errors::{BackendError, StoreError};
use crate::model::{self, Id};
use crate::pagination::{effective_order, Cursor, ListOptions};
use crate::query_builder::{QueryBuilder, QueryFilter};
use crate::response::ListResponse;
use crate::traits::{Store, TableMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::error::BoxDynError;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;
use uuid::Uuid;

#[async_trait]
impl<T: TableMetadata> Store for GenericStore<T> {
    type Model = T;

    async fn get(&self, id: Id) -> Result<T, StoreError> {
        self.fetch_one_where("get", QueryFilter::eq("id", Value::from(id)))
            .await
    }

    async fn get_by_external_id(&self, external_id: Uuid) -> Result<T, StoreError> {
        self.fetch_one_where(
            "get_by_external_id",
            QueryFilter::eq("external_id", Value::String(external_id.to_string())),
        )
        .await
    }

    async fn list(&self, options: ListOptions) -> Result<ListResponse<T>, StoreError> {
        self.list_scoped("list", Vec::new(), options).await
    }

    async fn list_by_relation_id(
        &self,
        id: Id,
        options: ListOptions,
    ) -> Result<ListResponse<T>, StoreError> {
        let key = self.relation_key.ok_or_else(|| {
            StoreError::validation(
                "relation_key",
                format!("{} has no relation key", self.schema.table),
            )
        })?;
        self.schema.allow.check_column(key)?;

        let scope = vec![QueryFilter::eq(key, Value::from(id))];
        self.list_scoped("list_by_relation_id", scope, options).await
    }

    async fn list_by_ids(&self, ids: &[Id]) -> Result<Vec<T>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut distinct = ids.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        let filter = QueryFilter::in_values("id", distinct);
        let (sql, values) = self.scoped(vec![filter]).build_sql(&self.schema.select_sql);
        crate::debug_log!("[{}] list_by_ids: {}", self.schema.table, sql);

        let statement = Statement::new(self.schema.table, "list_by_ids", &sql)
            .with_args(self.arguments(values, "list_by_ids")?);
        self.conn.fetch_all_as(statement).await
    }

    async fn count(&self, options: ListOptions) -> Result<i64, StoreError> {
        self.schema.allow.check_options(&options)?;

        let (sql, values) = self
            .scoped(options.filters)
            .build_sql(&self.schema.count_sql);
        crate::debug_log!("[{}] count: {}", self.schema.table, sql);

        let statement = Statement::new(self.schema.table, "count", &sql)
            .with_args(self.arguments(values, "count")?);
        self.conn.fetch_scalar::<i64>(statement).await
    }

    async fn save(&self, entity: &mut T) -> Result<(), StoreError> {
        let now = model::now();
        let external_id = match entity.external_id() {
            id if id.is_nil() => Uuid::new_v4(),
            id => id,
        };

        let args = create_arguments(&*entity, external_id, now)
            .map_err(|e| bind_error(self.schema.table, "save", e))?;

        crate::debug_log!("[{}] save: {}", self.schema.table, self.schema.insert_sql);
        let statement =
            Statement::new(self.schema.table, "save", &self.schema.insert_sql).with_args(args);
        let id: Id = self.conn.fetch_scalar(statement).await?;

        let model = entity.model_mut();
        model.id = id;
        model.external_id = external_id;
        model.created_at = now;
        model.updated_at = now;
        Ok(())
    }

    async fn update(&self, entity: &mut T) -> Result<(), StoreError> {
        let now = model::now();

        let mut args = update_arguments(&*entity, now)
            .map_err(|e| bind_error(self.schema.table, "update", e))?;

        let (where_clause, values) = self
            .scoped(vec![QueryFilter::eq("id", Value::from(entity.id()))])
            .build_where_clause_from(self.schema.update_where_param);
        for value in values {
            bind_json_value(&mut args, value).map_err(|e| bind_error(self.schema.table, "update", e))?;
        }

        let sql = format!("{} {}", self.schema.update_sql, where_clause);
        crate::debug_log!("[{}] update: {}", self.schema.table, sql);
        let statement = Statement::new(self.schema.table, "update", &sql).with_args(args);
        self.expect_one_row(self.conn.execute(statement).await?)?;

        entity.model_mut().updated_at = now;
        Ok(())
    }

    async fn delete(&self, id: Id) -> Result<(), StoreError> {
        self.delete_where("delete", QueryFilter::eq("id", Value::from(id)))
            .await
    }

    async fn delete_by_external_id(&self, external_id: Uuid) -> Result<(), StoreError> {
        self.delete_where(
            "delete_by_external_id",
            QueryFilter::eq("external_id", Value::String(external_id.to_string())),
        )
        .await
    }
}

impl<T: TableMetadata> GenericStore<T> {
    /// Query builder preloaded with the store's default predicates
    fn scoped(&self, filters: Vec<QueryFilter>) -> QueryBuilder {
        QueryBuilder::new()
            .with_casts(self.schema.casts.clone())
            .filters(self.default_filters.iter().cloned())
            .filters(filters)
    }

    fn arguments(&self, values: Vec<Value>, operation: &str) -> Result<PgArguments, StoreError> {
        let mut args = PgArguments::default();
        for value in values {
            bind_json_value(&mut args, value)
                .map_err(|e| bind_error(self.schema.table, operation, e))?;
        }
        Ok(args)
    }

    fn expect_one_row(&self, rows_affected: u64) -> Result<(), StoreError> {
        if rows_affected == 1 {
            Ok(())
        } else {
            Err(StoreError::not_found(self.schema.table))
        }
    }

    async fn fetch_one_where(&self, operation: &str, filter: QueryFilter) -> Result<T, StoreError> {
        let (sql, values) = self.scoped(vec![filter]).build_sql(&self.schema.select_sql);
        crate::debug_log!("[{}] {}: {}", self.schema.table, operation, sql);

        let statement = Statement::new(self.schema.table, operation, &sql)
            .with_args(self.arguments(values, operation)?);
        self.conn.fetch_one_as(statement).await
    }

    async fn delete_where(&self, operation: &str, filter: QueryFilter) -> Result<(), StoreError> {
        let (sql, values) = self.scoped(vec![filter]).build_sql(&self.schema.delete_sql);
        crate::debug_log!("[{}] {}: {}", self.schema.table, operation, sql);

        let statement = Statement::new(self.schema.table, operation, &sql)
            .with_args(self.arguments(values, operation)?);
        self.expect_one_row(self.conn.execute(statement).await?)
    }

    /// One page of rows matching defaults, `scope` and the caller's options
    async fn list_scoped(
        &self,
        operation: &str,
        scope: Vec<QueryFilter>,
        options: ListOptions,
    ) -> Result<ListResponse<T>, StoreError> {
        self.schema.allow.check_options(&options)?;
        if !options.include.is_empty() && self.relation_loader.is_none() {
            return Err(StoreError::validation(
                "include",
                format!("{} has no relation loader", self.schema.table),
            ));
        }

        let limit = self.limits.resolve(options.limit) as usize;
        let ListOptions {
            filters,
            sort,
            include,
            cursor,
            ..
        } = options;

        let mut builder = self.scoped(scope).filters(filters);
        if let Some(token) = cursor.as_deref() {
            builder = builder.filter(Cursor::decode(token, &sort)?.predicate(&sort));
        }
        for (field, order) in effective_order(&sort) {
            builder = builder.order_by(&field, order);
        }
        let (sql, values) = builder.limit(limit as i64 + 1).build_sql(&self.schema.select_sql);
        crate::debug_log!("[{}] {}: {}", self.schema.table, operation, sql);

        let statement = Statement::new(self.schema.table, operation, &sql)
            .with_args(self.arguments(values, operation)?);
        let mut rows: Vec<T> = self.conn.fetch_all_as(statement).await?;

        let next_cursor = if rows.len() > limit {
            rows.truncate(limit);
            match rows.last() {
                Some(last) => Some(Cursor::after(last, &sort)?.encode()?),
                None => None,
            }
        } else {
            None
        };

        if let Some(loader) = &self.relation_loader {
            for relation in &include {
                loader.attach(&self.conn, &mut rows, relation).await?;
            }
        }

        Ok(ListResponse::new(rows, next_cursor))
    }
}

/// `external_id, created_at, updated_at` followed by the entity's create fields
fn create_arguments<T: TableMetadata>(
    entity: &T,
    external_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PgArguments, BoxDynError> {
    let mut args = PgArguments::default();
    args.add(external_id)?;
    args.add(now)?;
    args.add(now)?;
    entity.bind_create_params(&mut args)?;
    Ok(args)
}

/// `updated_at` followed by the entity's update fields
fn update_arguments<T: TableMetadata>(entity: &T, now: DateTime<Utc>) -> Result<PgArguments, BoxDynError> {
    let mut args = PgArguments::default();
    args.add(now)?;
    entity.bind_update_params(&mut args)?;
    Ok(args)
}

/// Bind a predicate value
///
/// Values of typed placeholders arrive as text and PostgreSQL casts them;
/// strings are never reinterpreted. Other shapes bind as their nearest type.
fn bind_json_value(args: &mut PgArguments, value: Value) -> Result<(), BoxDynError> {
    match value {
        Value::String(s) => args.add(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                    args.add(i as i32)
                } else {
                    args.add(i)
                }
            } else if let Some(f) = n.as_f64() {
                args.add(f)
            } else {
                args.add(n.to_string())
            }
        }
        Value::Bool(b) => args.add(b),
        Value::Null => args.add(Option::<String>::None),
        other => args.add(other.to_string()),
    }
}

fn bind_error(table: &str, operation: &str, err: BoxDynError) -> StoreError {
    StoreError::backend(table, operation, BackendError::Bind(err.to_string()))
}
