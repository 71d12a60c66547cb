//! Listing options and keyset pagination
//!
//! A listing request is a [`ListOptions`]: predicates, sort keys, relation
//! includes, an optional cursor and an optional page size. Pages are
//! forward-only; the cursor of one page carries the sort values of its last
//! row and the next request continues strictly after them.

pub mod cursor;

pub use cursor::Cursor;

use crate::errors::StoreError;
use crate::query_builder::{QueryFilter, QueryOperator, SortOrder};
use serde_json::Value;

/// Page size used when nothing else is configured
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page size a caller can get when nothing else is configured
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Filter, sort, include and paging options of a listing request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub filters: Vec<QueryFilter>,
    pub sort: Vec<(String, SortOrder)>,
    pub include: Vec<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate (combined with AND)
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a sort key; earlier keys take precedence
    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push((field.to_string(), order));
        self
    }

    /// Eager-load a relation on every returned row
    pub fn include(mut self, relation: &str) -> Self {
        self.include.push(relation.to_string());
        self
    }

    /// Continue after the page that returned `cursor`
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Requested page size; 0 means the store default
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Parse `field` or `-field` sort keys, e.g. from a query string
    pub fn parse_sort(keys: &str) -> Vec<(String, SortOrder)> {
        keys.split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| match key.strip_prefix('-') {
                Some(field) => (field.to_string(), SortOrder::Desc),
                None => (key.trim_start_matches('+').to_string(), SortOrder::Asc),
            })
            .collect()
    }
}

impl ListOptions {
    /// Build options from decoded query-string pairs
    ///
    /// `sort`, `include`, `cursor` and `limit` are reserved keys. Any other
    /// key is a filter: `field=value` for equality or `field[op]=value` with
    /// an operator name such as `gte`, `like` or `in` (comma separated list).
    /// Values stay strings; the store casts them to the column's type.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::new();
        for (key, raw) in pairs {
            let (key, raw) = (key.as_ref(), raw.as_ref());
            match key {
                "sort" => options.sort.extend(Self::parse_sort(raw)),
                "include" => options.include.extend(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string),
                ),
                "cursor" => options.cursor = Some(raw.to_string()).filter(|c| !c.is_empty()),
                "limit" => {
                    let limit = raw
                        .trim()
                        .parse()
                        .map_err(|_| StoreError::validation("limit", "must be a non-negative integer"))?;
                    options.limit = Some(limit);
                }
                _ => options.filters.push(query_filter(key, raw)?),
            }
        }
        Ok(options)
    }
}

fn query_filter(key: &str, raw: &str) -> Result<QueryFilter, StoreError> {
    let (field, operator) = match key.split_once('[') {
        Some((field, rest)) => {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| StoreError::validation(key, "malformed filter key"))?;
            let operator = QueryOperator::parse(name)
                .ok_or_else(|| StoreError::validation(field, format!("unknown operator '{}'", name)))?;
            (field, operator)
        }
        None => (key, QueryOperator::Eq),
    };
    if field.is_empty() {
        return Err(StoreError::validation(key, "missing field name"));
    }

    let value = match operator {
        QueryOperator::IsNull | QueryOperator::IsNotNull => None,
        QueryOperator::In | QueryOperator::NotIn => Some(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(Value::from)
                .collect(),
        )),
        _ => Some(Value::from(raw)),
    };
    Ok(QueryFilter::condition(field, operator, value))
}

/// Page size policy of a store
///
/// Absent or zero requests get the default; anything above the maximum is
/// capped silently. There is no unbounded listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    default_page_size: u32,
    max_page_size: u32,
}

impl PageLimits {
    /// Limits with `default_page_size` clamped into `1..=max_page_size`
    pub fn new(default_page_size: u32, max_page_size: u32) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            default_page_size: default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    pub fn default_page_size(&self) -> u32 {
        self.default_page_size
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Effective page size for a requested one
    pub fn resolve(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.default_page_size,
            Some(n) => n.min(self.max_page_size),
        }
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

/// Sort keys actually applied: the requested ones plus `id` as tie-break
///
/// `id` takes the direction of the last requested key (ascending when none).
/// Keys after an explicit `id` could never change the order, so an `id`
/// anywhere in the request ends the list there.
pub fn effective_order(sort: &[(String, SortOrder)]) -> Vec<(String, SortOrder)> {
    if let Some(pos) = sort.iter().position(|(field, _)| field == "id") {
        return sort[..=pos].to_vec();
    }
    let tie_break = sort.last().map(|(_, order)| *order).unwrap_or(SortOrder::Asc);
    let mut order = sort.to_vec();
    order.push(("id".to_string(), tie_break));
    order
}
