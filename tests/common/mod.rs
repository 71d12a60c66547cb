//! Shared setup for the database-backed integration tests
//!
//! Tests read `DATABASE_URL` (environment or `.env`) and return early when it
//! is unset. Each test works under its own random tag or names, so tests can
//! share tables and run in parallel.

#![allow(dead_code)]

use storekit::prelude::*;

const SCHEMA: &str = r#"
BEGIN;
SELECT pg_advisory_xact_lock(7310401);
CREATE TABLE IF NOT EXISTS contacts (
    id BIGSERIAL PRIMARY KEY,
    external_id UUID NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    company TEXT NOT NULL,
    subject TEXT NOT NULL,
    message TEXT NOT NULL,
    tag TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS companies (
    id BIGSERIAL PRIMARY KEY,
    external_id UUID NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS employees (
    id BIGSERIAL PRIMARY KEY,
    external_id UUID NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    name TEXT NOT NULL,
    company_id BIGINT
);
COMMIT;
"#;

/// Connected aggregate with the test tables in place, or `None` without a database
pub async fn setup() -> Option<StoreKit> {
    let Ok(database) = DatabaseConfig::from_env() else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };
    let config = AppConfig {
        database: database.with_retry(1, 0),
        pagination: PaginationConfig::new(10, 50),
    };

    let kit = StoreKit::new(&config).await.expect("connect to DATABASE_URL");
    sqlx::raw_sql(SCHEMA)
        .execute(kit.pool())
        .await
        .expect("create test tables");
    Some(kit)
}

/// Tag unique to one test run
pub fn unique_tag() -> String {
    format!("test-{}", Uuid::new_v4().simple())
}

pub fn contact(first_name: &str, tag: &str) -> Contact {
    Contact {
        model: Model::new(),
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        phone: String::new(),
        company: "Acme".to_string(),
        subject: "Hello".to_string(),
        message: "Just testing".to_string(),
        tag: tag.to_string(),
    }
}

pub fn by_tag(tag: &str) -> QueryFilter {
    QueryFilter::eq("tag", serde_json::json!(tag))
}
