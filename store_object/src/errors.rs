//! Error types returned by every store operation
//!
//! The store layer never logs. It classifies what went wrong and hands the
//! error back to the caller.

use thiserror::Error;

/// PostgreSQL SQLSTATE for `unique_violation`
pub const POSTGRES_UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: no matching row in {table}")]
    NotFound { table: String },

    #[error("Duplicated: unique constraint {} violated on {table}", .constraint.as_deref().unwrap_or("<unnamed>"))]
    Duplicated {
        table: String,
        constraint: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    #[error("Validation error on '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Database error in {table}.{operation}: {source}")]
    Backend {
        table: String,
        operation: String,
        #[source]
        source: BackendError,
    },

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("{source} (rollback also failed: {rollback})")]
    Rollback {
        #[source]
        source: Box<StoreError>,
        rollback: Box<StoreError>,
    },
}

/// Underlying cause of a [`StoreError::Backend`]
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to bind parameter: {0}")]
    Bind(String),

    #[error("statement timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Kind of a [`StoreError`], for callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Duplicated,
    Validation,
    Backend,
    NoActiveTransaction,
}

impl ErrorKind {
    /// HTTP-style status a boundary layer would answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Duplicated | ErrorKind::Validation => 400,
            ErrorKind::Backend | ErrorKind::NoActiveTransaction => 500,
        }
    }
}

impl StoreError {
    pub fn not_found(table: &str) -> Self {
        StoreError::NotFound {
            table: table.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a driver error raised while running `operation` against `table`
    ///
    /// `RowNotFound` becomes [`StoreError::NotFound`], a unique violation becomes
    /// [`StoreError::Duplicated`], everything else is [`StoreError::Backend`].
    pub fn database_operation(table: &str, operation: &str, err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return Self::not_found(table);
        }
        if is_unique_violation(&err, None) {
            let constraint = constraint_name(&err);
            return StoreError::Duplicated {
                table: table.to_string(),
                constraint,
                source: err,
            };
        }
        StoreError::Backend {
            table: table.to_string(),
            operation: operation.to_string(),
            source: BackendError::Sqlx(err),
        }
    }

    pub fn backend(table: &str, operation: &str, source: BackendError) -> Self {
        StoreError::Backend {
            table: table.to_string(),
            operation: operation.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Duplicated { .. } => ErrorKind::Duplicated,
            StoreError::Validation { .. } => ErrorKind::Validation,
            StoreError::Backend { .. } => ErrorKind::Backend,
            StoreError::NoActiveTransaction => ErrorKind::NoActiveTransaction,
            StoreError::Rollback { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_duplicated(&self) -> bool {
        self.kind() == ErrorKind::Duplicated
    }

    /// True if this is a duplicate on the named constraint
    pub fn is_duplicated_on(&self, constraint: &str) -> bool {
        match self {
            StoreError::Duplicated {
                constraint: Some(name),
                ..
            } => name == constraint,
            StoreError::Rollback { source, .. } => source.is_duplicated_on(constraint),
            _ => false,
        }
    }
}

/// Decide whether `err` is a PostgreSQL unique violation
///
/// With `constraint` set, the violation must also be reported against that
/// constraint name. Classification reads the SQLSTATE code, so it needs no
/// extra round-trip and cannot race with a concurrent insert.
pub fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    if db_err.code().as_deref() != Some(POSTGRES_UNIQUE_VIOLATION) {
        return false;
    }
    match constraint {
        Some(name) => db_err.constraint() == Some(name),
        None => true,
    }
}

fn constraint_name(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = StoreError::database_operation("contacts", "get", sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.kind().status_code(), 404);
    }

    #[test]
    fn other_driver_errors_map_to_backend() {
        let err = StoreError::database_operation("contacts", "list", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert_eq!(err.kind().status_code(), 500);
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut, None));
    }

    #[test]
    fn rollback_reports_kind_of_source() {
        let err = StoreError::Rollback {
            source: Box::new(StoreError::validation("email", "bad")),
            rollback: Box::new(StoreError::NoActiveTransaction),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("rollback also failed"));
    }

    #[test]
    fn validation_message_names_field() {
        let err = StoreError::validation("nickname", "unknown field");
        assert_eq!(err.to_string(), "Validation error on 'nickname': unknown field");
        assert_eq!(err.kind().status_code(), 400);
    }
}
