//! Core StoreKit functionality
//!
//! [`StoreKit`] owns the database handle and hands out stores bound to it.
//! Inside [`StoreKit::with_transaction`] the same aggregate is rebound to the
//! transaction, so every store it returns runs in that scope.

use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use store_object::traits::TableMetadata;
use store_object::{Connection, GenericStore, PageLimits, StoreError};
use tracing::{info, warn};

use crate::contact::Contact;
use crate::errors::StoreKitError;
use crate::debug_log;
use config::{AppConfig, DatabaseConfig, PaginationConfig};

type Registry = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Outcome of [`StoreKit::health_check`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    /// Error of the ping, `None` when it succeeded
    pub ping: Option<String>,
}

impl HealthCheckResult {
    pub fn all_ok(&self) -> bool {
        self.ping.is_none()
    }
}

/// Store aggregate over one database handle
#[derive(Clone)]
pub struct StoreKit {
    conn: Connection,
    limits: PageLimits,
    stores: Arc<Registry>,
}

impl std::fmt::Debug for StoreKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreKit")
            .field("conn", &self.conn)
            .field("limits", &self.limits)
            .field("stores", &self.list_stores())
            .finish()
    }
}

impl StoreKit {
    /// Connect with the given configuration
    ///
    /// The initial connect is retried `connect_max_attempts` times with a
    /// fixed delay before giving up with [`StoreKitError::Unreachable`].
    pub async fn new(config: &AppConfig) -> Result<Self, StoreKitError> {
        config.validate()?;
        let pool = connect_with_retry(&config.database).await?;
        info!(
            max_connections = config.database.max_connections,
            "connected to database"
        );

        let mut conn = Connection::new(pool);
        if let Some(timeout) = config.database.statement_timeout() {
            conn = conn.with_statement_timeout(timeout);
        }
        Ok(Self::from_connection(conn, config.pagination))
    }

    /// Aggregate over an existing pool
    pub fn from_pool(pool: PgPool, pagination: PaginationConfig) -> Self {
        Self::from_connection(Connection::new(pool), pagination)
    }

    fn from_connection(conn: Connection, pagination: PaginationConfig) -> Self {
        Self {
            conn,
            limits: PageLimits::new(pagination.default_page_size, pagination.max_page_size),
            stores: Arc::new(HashMap::new()),
        }
    }

    /// Get database pool reference
    pub fn pool(&self) -> &PgPool {
        self.conn.pool()
    }

    /// Handle stores run on: the pool, or the current transaction
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn page_limits(&self) -> PageLimits {
        self.limits
    }

    /// Store for contact form submissions
    pub fn contacts(&self) -> GenericStore<Contact> {
        self.store::<Contact>()
    }

    /// Plain store for any entity, bound to the current handle
    pub fn store<T: TableMetadata>(&self) -> GenericStore<T> {
        GenericStore::new(self.conn.clone()).with_pagination(self.limits)
    }

    /// Register a configured store under a name
    pub fn register_store<T: TableMetadata>(
        &mut self,
        name: impl Into<String>,
        store: GenericStore<T>,
    ) -> Result<(), StoreKitError> {
        let name = name.into();
        if self.stores.contains_key(&name) {
            return Err(StoreKitError::StoreAlreadyRegistered(name));
        }

        debug_log!("Registering store {} for table {}", name, T::table_name());
        Arc::make_mut(&mut self.stores).insert(name, Arc::new(store));
        Ok(())
    }

    /// Registered store by name, rebound to the current handle
    pub fn get_store<T: TableMetadata>(&self, name: &str) -> Result<GenericStore<T>, StoreKitError> {
        self.stores
            .get(name)
            .and_then(|store| store.downcast_ref::<GenericStore<T>>())
            .map(|store| store.with_connection(self.conn.clone()))
            .ok_or_else(|| StoreKitError::StoreNotFound(name.to_string()))
    }

    /// List all registered store names
    pub fn list_stores(&self) -> Vec<&String> {
        self.stores.keys().collect()
    }

    /// Remove a store by name
    pub fn unregister_store(&mut self, name: &str) -> Result<(), StoreKitError> {
        Arc::make_mut(&mut self.stores)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreKitError::StoreNotFound(name.to_string()))
    }

    /// Run `f` in a transaction, or in a savepoint when already inside one
    ///
    /// `f` receives this aggregate rebound to the new scope. The scope commits
    /// when `f` returns `Ok` and rolls back on `Err` or panic.
    pub async fn with_transaction<F, Fut, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(StoreKit) -> Fut,
        Fut: Future<Output = Result<R, StoreError>>,
    {
        self.conn
            .run_in_transaction(|conn| f(self.rebind(conn)))
            .await
    }

    /// Same aggregate on another handle
    pub fn rebind(&self, conn: Connection) -> StoreKit {
        Self {
            conn,
            limits: self.limits,
            stores: self.stores.clone(),
        }
    }

    /// Check database connection health
    pub async fn health_check(&self) -> HealthCheckResult {
        match self.conn.ping().await {
            Ok(()) => HealthCheckResult { ping: None },
            Err(err) => {
                warn!(error = %err, "database health check failed");
                HealthCheckResult {
                    ping: Some(err.to_string()),
                }
            }
        }
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let mut pool_options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connection_timeout())
        .idle_timeout(config.idle_timeout());

    // Set max lifetime if specified
    if config.max_lifetime_seconds > 0 {
        pool_options = pool_options.max_lifetime(config.max_lifetime());
    }
    pool_options
}

async fn connect_with_retry(config: &DatabaseConfig) -> Result<PgPool, StoreKitError> {
    let connection_string = config.connection_string();
    let attempts = config.connect_max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match pool_options(config).connect(&connection_string).await {
            Ok(pool) => return Ok(pool),
            Err(source) if attempt >= attempts => {
                return Err(StoreKitError::Unreachable { attempts, source });
            }
            Err(err) => {
                warn!(
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "database connection failed, retrying in {:?}",
                    config.connect_retry_delay()
                );
                tokio::time::sleep(config.connect_retry_delay()).await;
                attempt += 1;
            }
        }
    }
}
