use crate::connection::Connection;
use crate::pagination::PageLimits;
use crate::query_builder::{ColumnCasts, QueryFilter};
use crate::traits::table_metadata::base_column_type;
use crate::traits::{RelationLoader, TableMetadata};
use crate::validation::AllowList;
use sqlx::TypeInfo;
use std::sync::Arc;

/// SQL and allow-lists of one entity type, rendered once per store
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: &'static str,
    pub allow: AllowList,
    /// PostgreSQL type of every column, for casting predicate parameters
    pub casts: Arc<ColumnCasts>,
    /// `SELECT <columns> FROM <table>`
    pub select_sql: String,
    /// `SELECT COUNT(*) FROM <table>`
    pub count_sql: String,
    /// `INSERT ... RETURNING id`; external_id, created_at and updated_at come first
    pub insert_sql: String,
    /// `UPDATE <table> SET updated_at = $1, ...` without the WHERE clause
    pub update_sql: String,
    /// First parameter number free after the SET assignments
    pub update_where_param: usize,
    /// `DELETE FROM <table>`
    pub delete_sql: String,
}

impl TableSchema {
    pub fn of<T: TableMetadata>() -> Self {
        let table = T::table_name();
        let columns = T::all_columns();
        let create_fields = T::create_fields();
        let update_fields = T::update_fields();

        let insert_columns: Vec<&str> = ["external_id", "created_at", "updated_at"]
            .into_iter()
            .chain(create_fields.iter().copied())
            .collect();
        let placeholders: Vec<String> = (1..=insert_columns.len()).map(|i| format!("${}", i)).collect();

        let assignments: Vec<String> = std::iter::once("updated_at")
            .chain(update_fields.iter().copied())
            .enumerate()
            .map(|(i, field)| format!("{} = ${}", field, i + 1))
            .collect();

        let casts: ColumnCasts = columns
            .iter()
            .filter_map(|&column| {
                let type_info = base_column_type(column).or_else(|| T::column_type(column))?;
                Some((column, type_info.name().to_string()))
            })
            .collect();

        Self {
            table,
            casts: Arc::new(casts),
            select_sql: format!("SELECT {} FROM {}", columns.join(", "), table),
            count_sql: format!("SELECT COUNT(*) FROM {}", table),
            insert_sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
                table,
                insert_columns.join(", "),
                placeholders.join(", ")
            ),
            update_sql: format!("UPDATE {} SET {}", table, assignments.join(", ")),
            update_where_param: assignments.len() + 1,
            delete_sql: format!("DELETE FROM {}", table),
            allow: AllowList::new(columns, T::relations().to_vec()),
        }
    }
}

/// Generic store providing every operation of [`Store`](crate::traits::Store)
/// for one entity type
pub struct GenericStore<T: TableMetadata> {
    pub(crate) conn: Connection,
    pub(crate) schema: Arc<TableSchema>,
    pub(crate) default_filters: Arc<Vec<QueryFilter>>,
    pub(crate) relation_key: Option<&'static str>,
    pub(crate) limits: PageLimits,
    pub(crate) relation_loader: Option<Arc<dyn RelationLoader<T>>>,
}

impl<T: TableMetadata> Clone for GenericStore<T> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            schema: self.schema.clone(),
            default_filters: self.default_filters.clone(),
            relation_key: self.relation_key,
            limits: self.limits,
            relation_loader: self.relation_loader.clone(),
        }
    }
}

impl<T: TableMetadata> std::fmt::Debug for GenericStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericStore")
            .field("table", &self.schema.table)
            .field("conn", &self.conn)
            .field("default_filters", &self.default_filters.len())
            .field("relation_key", &self.relation_key)
            .field("limits", &self.limits)
            .field("has_relation_loader", &self.relation_loader.is_some())
            .finish()
    }
}

impl<T: TableMetadata> GenericStore<T> {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            schema: Arc::new(TableSchema::of::<T>()),
            default_filters: Arc::new(Vec::new()),
            relation_key: None,
            limits: PageLimits::default(),
            relation_loader: None,
        }
    }

    /// Predicates ANDed into every statement with a WHERE clause
    pub fn with_default_filters(mut self, filters: Vec<QueryFilter>) -> Self {
        self.default_filters = Arc::new(filters);
        self
    }

    /// Foreign-key column used by `list_by_relation_id`
    pub fn with_relation_key(mut self, column: &'static str) -> Self {
        self.relation_key = Some(column);
        self
    }

    pub fn with_pagination(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_relation_loader(mut self, loader: Arc<dyn RelationLoader<T>>) -> Self {
        self.relation_loader = Some(loader);
        self
    }

    /// Same store on another handle, e.g. a transaction
    pub fn with_connection(&self, conn: Connection) -> Self {
        Self {
            conn,
            ..self.clone()
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn default_filters(&self) -> &[QueryFilter] {
        &self.default_filters
    }

    pub fn relation_key(&self) -> Option<&'static str> {
        self.relation_key
    }

    pub fn page_limits(&self) -> PageLimits {
        self.limits
    }
}
