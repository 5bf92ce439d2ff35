//! Read access to the `users` collaborator table.

use repairlink_core::types::DbId;
use sqlx::PgPool;

use crate::models::directory::User;

const COLUMNS: &str = "id, role, display_name, created_at, updated_at";

/// Provides lookups for user identities.
pub struct UserRepo;

impl UserRepo {
    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a user. Identity management lives elsewhere; this exists for
    /// seeding fixtures.
    pub async fn create(
        pool: &PgPool,
        role: &str,
        display_name: &str,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (role, display_name) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(role)
            .bind(display_name)
            .fetch_one(pool)
            .await
    }
}
