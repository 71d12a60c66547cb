//! # StoreKit
//!
//! A generic transactional data-access layer for PostgreSQL: one store
//! implementation for any entity, nested transactions through savepoints,
//! cursor pagination, declarative filters and batched relation loading.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storekit::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     storekit::init_tracing();
//!
//!     let config = AppConfig::load()?;
//!     let kit = StoreKit::new(&config).await?;
//!
//!     let request = ContactRequest {
//!         first_name: "Ada".to_string(),
//!         email: "ada@example.com".to_string(),
//!         message: "Hello".to_string(),
//!         ..Default::default()
//!     };
//!     request.validate()?;
//!
//!     let mut contact = request.contact("website");
//!     kit.with_transaction(|tx| async move {
//!         tx.contacts().save(&mut contact).await?;
//!         Ok(contact)
//!     })
//!     .await?;
//!
//!     let page = kit
//!         .contacts()
//!         .list(
//!             ListOptions::new()
//!                 .filter(QueryFilter::eq("tag", serde_json::json!("website")))
//!                 .sort_by("created_at", SortOrder::Desc)
//!                 .limit(20),
//!         )
//!         .await?;
//!     println!("{} contacts, more: {}", page.len(), !page.is_last_page());
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod contact;
pub mod core;
pub mod errors;
pub mod prelude;

// Re-export the main public types for convenience
pub use contact::{Contact, ContactRequest};
pub use self::core::{HealthCheckResult, StoreKit};
pub use errors::StoreKitError;

// Re-export centralized config
pub use config::{AppConfig, DatabaseConfig, PaginationConfig};

// Re-export internal crates used by macros and public API
// These MUST be public for the generated macro code to work correctly
pub use store_object;
pub use table_derive;

// Re-export external dependencies used in public API
pub use async_trait;
pub use sqlx;

/// Install a `tracing` subscriber filtered by `RUST_LOG`
///
/// Defaults to `info` when `RUST_LOG` is unset. Calling it again is harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    trace_log!("tracing initialised");
}
