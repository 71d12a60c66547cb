//! Validation module
//!
//! Allow-list checks run before any SQL is built. Identifier syntax is
//! checked at compile time by `#[derive(TableMetadata)]`; at runtime the
//! store only accepts names its entity declared.

use crate::errors::StoreError;
use crate::pagination::ListOptions;
use crate::query_builder::QueryFilter;

/// Columns and relations an entity exposes to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    columns: Vec<&'static str>,
    relations: Vec<&'static str>,
}

impl AllowList {
    pub fn new(columns: Vec<&'static str>, relations: Vec<&'static str>) -> Self {
        Self { columns, relations }
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn relations(&self) -> &[&'static str] {
        &self.relations
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(&name)
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.relations.contains(&name)
    }

    pub fn check_column(&self, name: &str) -> Result<(), StoreError> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(StoreError::validation(name, "unknown field"))
        }
    }

    pub fn check_relation(&self, name: &str) -> Result<(), StoreError> {
        if self.has_relation(name) {
            Ok(())
        } else {
            Err(StoreError::validation(name, "unknown relation"))
        }
    }

    /// Check every field a predicate tree mentions, groups included
    pub fn check_filter(&self, filter: &QueryFilter) -> Result<(), StoreError> {
        filter
            .fields()
            .into_iter()
            .try_for_each(|field| self.check_column(field))
    }

    /// Check filters, sort keys and includes of a listing request
    pub fn check_options(&self, options: &ListOptions) -> Result<(), StoreError> {
        for filter in &options.filters {
            self.check_filter(filter)?;
        }
        for (field, _) in &options.sort {
            self.check_column(field)?;
        }
        for relation in &options.include {
            self.check_relation(relation)?;
        }
        Ok(())
    }
}
