//! Predicate tree used by list options, default store filters and cursors
//!
//! Conditions compare one column with JSON values; groups combine them with
//! AND or OR and nest freely.

use serde_json::Value;

/// Query condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Eq,        // =
    Ne,        // !=
    Gt,        // >
    Gte,       // >=
    Lt,        // <
    Lte,       // <=
    Like,      // LIKE
    ILike,     // ILIKE (case insensitive)
    In,        // IN
    NotIn,     // NOT IN
    IsNull,    // IS NULL
    IsNotNull, // IS NOT NULL
}

impl QueryOperator {
    /// Parse the short operator names used by query strings (`eq`, `gte`, ...)
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name.to_ascii_lowercase().as_str() {
            "eq" => QueryOperator::Eq,
            "ne" | "neq" => QueryOperator::Ne,
            "gt" => QueryOperator::Gt,
            "gte" | "ge" => QueryOperator::Gte,
            "lt" => QueryOperator::Lt,
            "lte" | "le" => QueryOperator::Lte,
            "like" => QueryOperator::Like,
            "ilike" => QueryOperator::ILike,
            "in" => QueryOperator::In,
            "nin" | "not_in" => QueryOperator::NotIn,
            "null" | "is_null" => QueryOperator::IsNull,
            "not_null" | "is_not_null" => QueryOperator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }
}

/// Single condition in WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    pub field: String,
    pub operator: QueryOperator,
    pub value: Option<Value>, // None for IS NULL/IS NOT NULL
}

/// Logical operators for combining conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Query filter that can be nested
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    Condition(QueryCondition),
    Group {
        operator: LogicalOperator,
        filters: Vec<QueryFilter>,
    },
}

impl QueryFilter {
    pub fn condition(field: impl Into<String>, operator: QueryOperator, value: Option<Value>) -> Self {
        Self::Condition(QueryCondition {
            field: field.into(),
            operator,
            value,
        })
    }

    /// All of `filters`; an empty group matches every row
    pub fn and(filters: Vec<QueryFilter>) -> Self {
        Self::Group {
            operator: LogicalOperator::And,
            filters,
        }
    }

    /// Any of `filters`; an empty group matches no row
    pub fn or(filters: Vec<QueryFilter>) -> Self {
        Self::Group {
            operator: LogicalOperator::Or,
            filters,
        }
    }

    /// `field = value`, or `field IS NULL` for a JSON null
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Eq, Some(value.into()))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Ne, Some(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Gt, Some(value.into()))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Gte, Some(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Lt, Some(value.into()))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, QueryOperator::Lte, Some(value.into()))
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::condition(field, QueryOperator::Like, Some(Value::String(pattern.into())))
    }

    /// Case-insensitive LIKE
    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::condition(field, QueryOperator::ILike, Some(Value::String(pattern.into())))
    }

    /// `field IN (...)`; an empty list matches no row
    pub fn in_values<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::condition(field, QueryOperator::In, Some(Value::Array(values)))
    }

    /// `field NOT IN (...)`; an empty list matches every row
    pub fn not_in_values<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::condition(field, QueryOperator::NotIn, Some(Value::Array(values)))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::condition(field, QueryOperator::IsNull, None)
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::condition(field, QueryOperator::IsNotNull, None)
    }

    /// Every field name referenced by this filter, depth first
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            QueryFilter::Condition(condition) => out.push(&condition.field),
            QueryFilter::Group { filters, .. } => {
                for filter in filters {
                    filter.collect_fields(out);
                }
            }
        }
    }
}
