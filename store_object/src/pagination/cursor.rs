//! Opaque keyset cursor
//!
//! A cursor is URL-safe base64 (no padding) of a JSON payload holding the
//! sort signature it was issued for, the sort values of the last row of the
//! page and that row's id. Callers must treat it as an uninterpreted string.

use super::effective_order;
use crate::errors::StoreError;
use crate::model::Id;
use crate::query_builder::{QueryFilter, SortOrder};
use crate::traits::TableMetadata;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    sort: String,
    values: Vec<Value>,
    id: Id,
}

impl Cursor {
    /// Cursor positioned after `row` under `sort`
    pub fn after<T: TableMetadata>(row: &T, sort: &[(String, SortOrder)]) -> Result<Self, StoreError> {
        Self::from_lookup(sort, row.id(), |column| row.column_value(column))
    }

    /// Cursor from a row id and a column lookup
    pub fn from_lookup<F>(sort: &[(String, SortOrder)], id: Id, lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<Value>,
    {
        let order = effective_order(sort);
        let mut values = Vec::with_capacity(order.len() - 1);
        for (field, _) in &order[..order.len() - 1] {
            match lookup(field) {
                None => return Err(StoreError::validation(field.as_str(), "not a sortable column")),
                Some(Value::Null) => {
                    return Err(StoreError::validation(
                        field.as_str(),
                        "NULL sort keys are not supported for pagination",
                    ))
                }
                Some(value) => values.push(value),
            }
        }

        Ok(Self {
            sort: sort_signature(sort),
            values,
            id,
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn encode(&self) -> Result<String, StoreError> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| StoreError::validation("cursor", format!("cannot encode cursor: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Decode a token and check it belongs to a request sorted by `sort`
    pub fn decode(token: &str, sort: &[(String, SortOrder)]) -> Result<Self, StoreError> {
        let payload = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| StoreError::validation("cursor", "malformed cursor"))?;
        let cursor: Cursor = serde_json::from_slice(&payload)
            .map_err(|_| StoreError::validation("cursor", "malformed cursor"))?;

        if cursor.sort != sort_signature(sort) {
            return Err(StoreError::validation(
                "cursor",
                "cursor was issued for a different sort order",
            ));
        }
        if cursor.values.len() != effective_order(sort).len() - 1 {
            return Err(StoreError::validation("cursor", "malformed cursor"));
        }
        Ok(cursor)
    }

    /// Predicate selecting the rows strictly after this cursor
    ///
    /// `(k1 > v1) OR (k1 = v1 AND k2 > v2) OR ... OR (k1 = v1 AND ... AND id > last_id)`,
    /// with `<` in place of `>` for descending keys.
    pub fn predicate(&self, sort: &[(String, SortOrder)]) -> QueryFilter {
        let order = effective_order(sort);
        let keys: Vec<(&str, SortOrder, Value)> = order
            .iter()
            .zip(self.values.iter().cloned().chain(std::iter::once(Value::from(self.id))))
            .map(|((field, dir), value)| (field.as_str(), *dir, value))
            .collect();

        let branches = (0..keys.len())
            .map(|i| {
                let mut terms: Vec<QueryFilter> = keys[..i]
                    .iter()
                    .map(|(field, _, value)| QueryFilter::eq(*field, value.clone()))
                    .collect();
                let (field, dir, value) = &keys[i];
                terms.push(match dir {
                    SortOrder::Asc => QueryFilter::gt(*field, value.clone()),
                    SortOrder::Desc => QueryFilter::lt(*field, value.clone()),
                });
                QueryFilter::and(terms)
            })
            .collect();

        QueryFilter::or(branches)
    }
}

/// Stable text form of a sort order, e.g. `created_at:desc,email:asc`
pub fn sort_signature(sort: &[(String, SortOrder)]) -> String {
    sort.iter()
        .map(|(field, order)| format!("{}:{}", field, order.to_sql().to_ascii_lowercase()))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::{LogicalOperator, QueryOperator, SqlGenerator};
    use serde_json::json;
    use std::cmp::Ordering;
    use std::collections::HashMap;

    type Row = HashMap<&'static str, Value>;

    fn desc_created() -> Vec<(String, SortOrder)> {
        vec![("created_at".to_string(), SortOrder::Desc)]
    }

    #[test]
    fn test_predicate_sql_shape() {
        let sort = vec![
            ("tag".to_string(), SortOrder::Asc),
            ("created_at".to_string(), SortOrder::Desc),
        ];
        let cursor = Cursor::from_lookup(&sort, 42, |column| match column {
            "tag" => Some(json!("sales")),
            "created_at" => Some(json!("2024-05-01T10:00:00+00:00")),
            _ => None,
        })
        .unwrap();

        let (sql, values) = SqlGenerator::build_where_clause(&[cursor.predicate(&sort)]);

        assert_eq!(
            sql,
            "WHERE ((tag > $1) OR (tag = $2 AND created_at < $3) OR (tag = $4 AND created_at = $5 AND id < $6))"
        );
        assert_eq!(values.len(), 6);
        assert_eq!(values[5], json!(42));
    }

    #[test]
    fn test_round_trip_through_token() {
        let cursor = Cursor::from_lookup(&desc_created(), 7, |_| Some(json!("2024-01-01T00:00:00+00:00"))).unwrap();
        let token = cursor.encode().unwrap();

        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(Cursor::decode(&token, &desc_created()).unwrap(), cursor);
    }

    #[test]
    fn test_rejects_cursor_from_other_sort() {
        let token = Cursor::from_lookup(&desc_created(), 7, |_| Some(json!("x")))
            .unwrap()
            .encode()
            .unwrap();
        let other = vec![("created_at".to_string(), SortOrder::Asc)];

        match Cursor::decode(&token, &other).unwrap_err() {
            StoreError::Validation { field, .. } => assert_eq!(field, "cursor"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Cursor::decode("not a cursor!", &[]).unwrap_err().kind() == crate::errors::ErrorKind::Validation);
        let json_garbage = URL_SAFE_NO_PAD.encode(b"{\"sort\":1}");
        assert!(Cursor::decode(&json_garbage, &[]).is_err());
    }

    #[test]
    fn test_null_sort_key_is_rejected() {
        let err = Cursor::from_lookup(&desc_created(), 1, |_| Some(Value::Null)).unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref field, .. } if field == "created_at"));
    }

    // In-memory evaluation of the predicates a cursor produces

    fn compare(a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .unwrap()
                .partial_cmp(&y.as_f64().unwrap())
                .unwrap(),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => panic!("incomparable values {a} {b}"),
        }
    }

    fn matches(filter: &QueryFilter, row: &Row) -> bool {
        match filter {
            QueryFilter::Group { operator, filters } => match operator {
                LogicalOperator::And => filters.iter().all(|f| matches(f, row)),
                LogicalOperator::Or => filters.iter().any(|f| matches(f, row)),
            },
            QueryFilter::Condition(c) => {
                let ord = compare(&row[c.field.as_str()], c.value.as_ref().unwrap());
                match c.operator {
                    QueryOperator::Eq => ord == Ordering::Equal,
                    QueryOperator::Gt => ord == Ordering::Greater,
                    QueryOperator::Lt => ord == Ordering::Less,
                    other => panic!("unexpected operator {other:?}"),
                }
            }
        }
    }

    fn page(rows: &[Row], sort: &[(String, SortOrder)], cursor: Option<&str>, limit: usize) -> (Vec<i64>, Option<String>) {
        let order = effective_order(sort);
        let predicate = cursor.map(|token| Cursor::decode(token, sort).unwrap().predicate(sort));
        let mut selected: Vec<&Row> = rows
            .iter()
            .filter(|row| predicate.as_ref().map_or(true, |p| matches(p, row)))
            .collect();
        selected.sort_by(|a, b| {
            order
                .iter()
                .map(|(field, dir)| {
                    let ord = compare(&a[field.as_str()], &b[field.as_str()]);
                    if *dir == SortOrder::Desc { ord.reverse() } else { ord }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        selected.truncate(limit + 1);

        let next = if selected.len() > limit {
            selected.truncate(limit);
            let last = selected[limit - 1];
            let id = last["id"].as_i64().unwrap();
            Some(
                Cursor::from_lookup(sort, id, |column| last.get(column).cloned())
                    .unwrap()
                    .encode()
                    .unwrap(),
            )
        } else {
            None
        };
        (selected.iter().map(|row| row["id"].as_i64().unwrap()).collect(), next)
    }

    #[test]
    fn test_following_cursors_visits_every_row_once() {
        // Repeated tags force the id tie-break
        let rows: Vec<Row> = (1..=23)
            .map(|id| {
                HashMap::from([
                    ("id", json!(id)),
                    ("tag", json!(format!("t{}", id % 4))),
                ])
            })
            .collect();
        let sort = vec![("tag".to_string(), SortOrder::Desc)];

        for limit in [1usize, 2, 5, 10, 23, 50] {
            let mut seen = Vec::new();
            let mut pages = 0;
            let mut cursor: Option<String> = None;
            loop {
                let (ids, next) = page(&rows, &sort, cursor.as_deref(), limit);
                pages += 1;
                seen.extend(ids);
                match next {
                    Some(token) => cursor = Some(token),
                    None => break,
                }
            }

            let mut sorted = seen.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), seen.len(), "row visited twice with limit {limit}");
            assert_eq!(seen.len(), rows.len());
            assert_eq!(pages, rows.len().div_ceil(limit), "page count with limit {limit}");
        }
    }
}
