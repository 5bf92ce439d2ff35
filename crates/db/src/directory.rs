//! PostgreSQL-backed implementation of the collaborator contracts.

use async_trait::async_trait;
use repairlink_core::directory::{
    ApplianceCatalog, ApplianceInfo, Identity, IdentityProvider, SpecialtyIndex,
};
use repairlink_core::error::CoreError;
use repairlink_core::types::DbId;

use crate::repositories::{ApplianceRepo, TechnicianSpecialtyRepo, UserRepo};
use crate::DbPool;

/// Reads identities, appliances and specialties from the shared database.
#[derive(Clone)]
pub struct PgDirectory {
    pool: DbPool,
}

impl PgDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn internal(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Directory lookup failed");
    CoreError::Internal(err.to_string())
}

#[async_trait]
impl IdentityProvider for PgDirectory {
    async fn resolve(&self, user_id: DbId) -> Result<Option<Identity>, CoreError> {
        let user = UserRepo::find_by_id(&self.pool, user_id)
            .await
            .map_err(internal)?;
        Ok(user.map(Identity::from))
    }
}

#[async_trait]
impl ApplianceCatalog for PgDirectory {
    async fn get(&self, appliance_id: DbId) -> Result<Option<ApplianceInfo>, CoreError> {
        let appliance = ApplianceRepo::find_by_id(&self.pool, appliance_id)
            .await
            .map_err(internal)?;
        Ok(appliance.map(ApplianceInfo::from))
    }
}

#[async_trait]
impl SpecialtyIndex for PgDirectory {
    async fn specialties_of(&self, technician_id: DbId) -> Result<Vec<String>, CoreError> {
        TechnicianSpecialtyRepo::list_for_technician(&self.pool, technician_id)
            .await
            .map_err(internal)
    }

    async fn technicians_for(&self, appliance_type: &str) -> Result<Vec<DbId>, CoreError> {
        TechnicianSpecialtyRepo::list_technicians(&self.pool, appliance_type)
            .await
            .map_err(internal)
    }
}
