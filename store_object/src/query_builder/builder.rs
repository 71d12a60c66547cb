//! Fluent builder joining predicates, ordering and a limit onto a base query
//!
//! The store starts every statement from a cached `SELECT`, `COUNT`, `UPDATE`
//! or `DELETE` prefix and appends what the builder renders.

use crate::query_builder::filter::QueryFilter;
use crate::query_builder::ordering::SortOrder;
use crate::query_builder::sql_generation::{ColumnCasts, SqlGenerator};
use serde_json::Value;
use std::sync::Arc;

/// Query builder for constructing complex database queries
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    pub(crate) conditions: Vec<QueryFilter>,
    pub(crate) order_by: Vec<(String, SortOrder)>,
    pub(crate) limit: Option<i64>,
    pub(crate) casts: Option<Arc<ColumnCasts>>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            casts: None,
        }
    }

    /// Cast predicate placeholders to these column types
    pub fn with_casts(mut self, casts: Arc<ColumnCasts>) -> Self {
        self.casts = Some(casts);
        self
    }

    /// Add a filter condition
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.conditions.push(filter);
        self
    }

    /// Add multiple filters (combined with AND)
    pub fn filters(mut self, filters: impl IntoIterator<Item = QueryFilter>) -> Self {
        self.conditions.extend(filters);
        self
    }

    /// Add ordering
    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order_by.push((field.to_string(), order));
        self
    }

    /// Add limit
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> &[QueryFilter] {
        &self.conditions
    }

    /// Build WHERE clause
    pub fn build_where_clause(&self) -> (String, Vec<Value>) {
        self.build_where_clause_from(1)
    }

    /// Build WHERE clause whose parameters start at `$first_param`
    pub fn build_where_clause_from(&self, first_param: usize) -> (String, Vec<Value>) {
        match &self.casts {
            Some(casts) => SqlGenerator::build_typed_where_clause(&self.conditions, first_param, casts),
            None => SqlGenerator::build_where_clause_from(&self.conditions, first_param),
        }
    }

    /// Build ORDER BY clause
    pub fn build_order_clause(&self) -> String {
        SqlGenerator::build_order_clause(&self.order_by)
    }

    /// Build LIMIT clause
    pub fn build_limit_clause(&self) -> String {
        SqlGenerator::build_limit_clause(self.limit)
    }

    /// Build complete query parts (WHERE, ORDER BY, LIMIT, Values)
    pub fn build(&self) -> (String, String, String, Vec<Value>) {
        let (where_clause, values) = self.build_where_clause();
        let order_clause = self.build_order_clause();
        let limit_clause = self.build_limit_clause();

        (where_clause, order_clause, limit_clause, values)
    }

    /// Append the built clauses to `base_sql` (a `SELECT ... FROM table`)
    pub fn build_sql(&self, base_sql: &str) -> (String, Vec<Value>) {
        let (where_clause, order_clause, limit_clause, values) = self.build();

        let mut full_sql = String::with_capacity(
            base_sql.len() + where_clause.len() + order_clause.len() + limit_clause.len() + 3,
        );
        full_sql.push_str(base_sql);
        for clause in [&where_clause, &order_clause, &limit_clause] {
            if !clause.is_empty() {
                full_sql.push(' ');
                full_sql.push_str(clause);
            }
        }

        (full_sql, values)
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
