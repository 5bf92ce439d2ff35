//! Read access to the `appliances` collaborator table.

use repairlink_core::types::DbId;
use sqlx::PgPool;

use crate::models::directory::Appliance;

const COLUMNS: &str = "id, appliance_type, brand, model, created_at, updated_at";

pub struct ApplianceRepo;

impl ApplianceRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Appliance>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM appliances WHERE id = $1");
        sqlx::query_as::<_, Appliance>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert an appliance (fixture seeding).
    pub async fn create(
        pool: &PgPool,
        appliance_type: &str,
        brand: &str,
        model: &str,
    ) -> Result<Appliance, sqlx::Error> {
        let query = format!(
            "INSERT INTO appliances (appliance_type, brand, model) \
             VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Appliance>(&query)
            .bind(appliance_type)
            .bind(brand)
            .bind(model)
            .fetch_one(pool)
            .await
    }
}
