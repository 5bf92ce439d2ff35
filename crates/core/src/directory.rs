//! Contracts for the collaborators the negotiation core consumes but does
//! not own: identities, the appliance catalog and technician specialties.
//!
//! The PostgreSQL implementation lives in `repairlink_db::directory`; an
//! in-memory implementation for tests lives in `repairlink_negotiation::memory`.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::DbId;

/// A resolved platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: DbId,
    /// One of the constants in [`crate::roles`].
    pub role: String,
    pub display_name: String,
}

/// Read-only view of an appliance from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplianceInfo {
    pub id: DbId,
    /// Specialty key technicians declare, e.g. `"washing_machine"`.
    pub appliance_type: String,
    pub brand: String,
    pub model: String,
}

impl ApplianceInfo {
    /// Label shown in notifications, e.g. `"Samsung WW90 (washing_machine)"`.
    pub fn display_name(&self) -> String {
        format!("{} {} ({})", self.brand, self.model, self.appliance_type)
    }
}

/// "Given a user id, return role and identity."
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, user_id: DbId) -> Result<Option<Identity>, CoreError>;
}

/// "Given an appliance id, return its display name and type."
#[async_trait]
pub trait ApplianceCatalog: Send + Sync {
    async fn get(&self, appliance_id: DbId) -> Result<Option<ApplianceInfo>, CoreError>;
}

/// Technician specialty lookups in both directions.
#[async_trait]
pub trait SpecialtyIndex: Send + Sync {
    /// Appliance types the technician declared.
    async fn specialties_of(&self, technician_id: DbId) -> Result<Vec<String>, CoreError>;

    /// Technicians who declared the given appliance type.
    async fn technicians_for(&self, appliance_type: &str) -> Result<Vec<DbId>, CoreError>;
}

/// Every collaborator contract behind one object, as the engine and the
/// dispatcher consume them.
pub trait Directory: IdentityProvider + ApplianceCatalog + SpecialtyIndex {}

impl<T> Directory for T where T: IdentityProvider + ApplianceCatalog + SpecialtyIndex {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appliance_display_name_includes_type() {
        let info = ApplianceInfo {
            id: 3,
            appliance_type: "refrigerator".to_string(),
            brand: "LG".to_string(),
            model: "GR-X257".to_string(),
        };
        assert_eq!(info.display_name(), "LG GR-X257 (refrigerator)");
    }
}
