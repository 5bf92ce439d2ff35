//! PostgreSQL persistence for the RepairLink marketplace.
//!
//! - [`models`] -- row structs, status enums and request DTOs.
//! - [`repositories`] -- zero-sized repositories with async query methods.
//! - [`directory`] -- collaborator contracts backed by the read-only
//!   `users`, `appliances` and `technician_specialties` tables.

use sqlx::postgres::PgPoolOptions;

pub mod directory;
pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Apply all pending migrations embedded from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
