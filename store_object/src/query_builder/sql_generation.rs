//! SQL rendering for predicate trees and ordering
//!
//! Renders [`QueryFilter`] trees and sort keys into PostgreSQL fragments with
//! positional parameters. With [`ColumnCasts`] every placeholder is cast to
//! its column's type and its value travels as text, so `'0123'` stays a
//! string on a text column and `'10'` becomes a number on a bigint one.

use crate::query_builder::filter::{LogicalOperator, QueryCondition, QueryFilter, QueryOperator};
use crate::query_builder::ordering::SortOrder;
use serde_json::Value;
use std::collections::HashMap;

/// PostgreSQL type name per column, e.g. `"email" => "TEXT"`
pub type ColumnCasts = HashMap<&'static str, String>;

/// Parameter values collected while rendering
struct Params<'a> {
    values: Vec<Value>,
    next: usize,
    casts: Option<&'a ColumnCasts>,
}

impl Params<'_> {
    /// Placeholder for `value` compared against `field`
    fn push(&mut self, field: &str, value: &Value, pattern: bool) -> String {
        let cast = match self.casts {
            Some(_) if pattern => Some("TEXT"),
            Some(casts) => casts.get(field).map(String::as_str),
            None => None,
        };
        let param = match cast {
            Some(type_name) => {
                self.values.push(as_text(value));
                format!("${}::{}", self.next, type_name)
            }
            None => {
                self.values.push(value.clone());
                format!("${}", self.next)
            }
        };
        self.next += 1;
        param
    }
}

/// Text form PostgreSQL parses back into the cast type
fn as_text(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

pub struct SqlGenerator;

impl SqlGenerator {
    /// Build WHERE clause from conditions, numbering parameters from `$1`
    pub fn build_where_clause(conditions: &[QueryFilter]) -> (String, Vec<Value>) {
        Self::build_where_clause_from(conditions, 1)
    }

    /// Build WHERE clause with the first parameter numbered `first_param`
    ///
    /// Used when other parameters (UPDATE assignments) precede the predicates.
    pub fn build_where_clause_from(conditions: &[QueryFilter], first_param: usize) -> (String, Vec<Value>) {
        Self::render_where(conditions, first_param, None)
    }

    /// Build WHERE clause whose placeholders are cast to their column's type
    ///
    /// Fields missing from `casts` keep a bare placeholder and their JSON value.
    pub fn build_typed_where_clause(
        conditions: &[QueryFilter],
        first_param: usize,
        casts: &ColumnCasts,
    ) -> (String, Vec<Value>) {
        Self::render_where(conditions, first_param, Some(casts))
    }

    fn render_where(
        conditions: &[QueryFilter],
        first_param: usize,
        casts: Option<&ColumnCasts>,
    ) -> (String, Vec<Value>) {
        if conditions.is_empty() {
            return ("".to_string(), Vec::new());
        }

        let mut params = Params {
            values: Vec::new(),
            next: first_param,
            casts,
        };

        let conditions_sql = conditions
            .iter()
            .map(|condition| Self::build_condition_sql(condition, &mut params))
            .collect::<Vec<_>>()
            .join(" AND ");

        if conditions_sql.is_empty() {
            ("".to_string(), params.values)
        } else {
            (format!("WHERE {}", conditions_sql), params.values)
        }
    }

    fn build_condition_sql(filter: &QueryFilter, params: &mut Params<'_>) -> String {
        match filter {
            QueryFilter::Condition(condition) => Self::build_single_condition_sql(condition, params),
            QueryFilter::Group { operator, filters } => {
                if filters.is_empty() {
                    // Neutral element of the group
                    return match operator {
                        LogicalOperator::And => "1=1".to_string(),
                        LogicalOperator::Or => "1=0".to_string(),
                    };
                }

                let operator_str = match operator {
                    LogicalOperator::And => " AND ",
                    LogicalOperator::Or => " OR ",
                };

                let group_conditions = filters
                    .iter()
                    .map(|f| Self::build_condition_sql(f, params))
                    .collect::<Vec<_>>()
                    .join(operator_str);

                format!("({})", group_conditions)
            }
        }
    }

    fn build_single_condition_sql(condition: &QueryCondition, params: &mut Params<'_>) -> String {
        let field = &condition.field;

        let comparison = match condition.operator {
            QueryOperator::Eq => "=",
            QueryOperator::Ne => "!=",
            QueryOperator::Gt => ">",
            QueryOperator::Gte => ">=",
            QueryOperator::Lt => "<",
            QueryOperator::Lte => "<=",
            QueryOperator::Like => "LIKE",
            QueryOperator::ILike => "ILIKE",
            QueryOperator::In | QueryOperator::NotIn => {
                return Self::build_list_condition_sql(condition, params);
            }
            QueryOperator::IsNull => return format!("{} IS NULL", field),
            QueryOperator::IsNotNull => return format!("{} IS NOT NULL", field),
        };
        let pattern = matches!(condition.operator, QueryOperator::Like | QueryOperator::ILike);

        match (&condition.value, condition.operator) {
            (None | Some(Value::Null), QueryOperator::Eq) => format!("{} IS NULL", field),
            (None | Some(Value::Null), QueryOperator::Ne) => format!("{} IS NOT NULL", field),
            (None, _) => "1=0".to_string(), // Invalid condition
            (Some(value), _) => {
                let param = params.push(field, value, pattern);
                format!("{} {} {}", field, comparison, param)
            }
        }
    }

    fn build_list_condition_sql(condition: &QueryCondition, params: &mut Params<'_>) -> String {
        let negated = condition.operator == QueryOperator::NotIn;
        let array_values = match &condition.value {
            Some(Value::Array(array_values)) => array_values,
            _ => return (if negated { "1=1" } else { "1=0" }).to_string(),
        };

        if array_values.is_empty() {
            // Empty IN matches nothing, empty NOT IN matches everything
            return (if negated { "1=1" } else { "1=0" }).to_string();
        }

        let placeholders: Vec<String> = array_values
            .iter()
            .map(|value| params.push(&condition.field, value, false))
            .collect();

        let keyword = if negated { "NOT IN" } else { "IN" };
        format!("{} {} ({})", condition.field, keyword, placeholders.join(", "))
    }

    /// Build ORDER BY clause
    pub fn build_order_clause(order_by: &[(String, SortOrder)]) -> String {
        if order_by.is_empty() {
            return "".to_string();
        }

        let order_items: Vec<String> = order_by
            .iter()
            .map(|(field, order)| format!("{} {}", field, order.to_sql()))
            .collect();

        format!("ORDER BY {}", order_items.join(", "))
    }

    /// Build LIMIT clause
    pub fn build_limit_clause(limit: Option<i64>) -> String {
        match limit {
            Some(limit) => format!("LIMIT {}", limit),
            None => "".to_string(),
        }
    }
}
