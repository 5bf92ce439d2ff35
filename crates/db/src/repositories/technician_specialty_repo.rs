//! Read access to the `technician_specialties` collaborator table.

use repairlink_core::types::DbId;
use sqlx::PgPool;

/// Provides the technician <-> appliance type mapping used for routing.
pub struct TechnicianSpecialtyRepo;

impl TechnicianSpecialtyRepo {
    /// Appliance types a technician services, alphabetical.
    pub async fn list_for_technician(
        pool: &PgPool,
        technician_id: DbId,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT appliance_type FROM technician_specialties \
             WHERE technician_id = $1 ORDER BY appliance_type",
        )
        .bind(technician_id)
        .fetch_all(pool)
        .await
    }

    /// Technicians that service an appliance type.
    pub async fn list_technicians(
        pool: &PgPool,
        appliance_type: &str,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT technician_id FROM technician_specialties \
             WHERE appliance_type = $1 ORDER BY technician_id",
        )
        .bind(appliance_type)
        .fetch_all(pool)
        .await
    }

    /// Register a specialty (fixture seeding). Idempotent.
    pub async fn add(
        pool: &PgPool,
        technician_id: DbId,
        appliance_type: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO technician_specialties (technician_id, appliance_type) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(technician_id)
        .bind(appliance_type)
        .execute(pool)
        .await?;
        Ok(())
    }
}
