//! Rows of the read-only collaborator tables.

use repairlink_core::directory::{ApplianceInfo, Identity};
use repairlink_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub role: String,
    pub display_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Identity {
            id: user.id,
            role: user.role,
            display_name: user.display_name,
        }
    }
}

/// A row from the `appliances` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Appliance {
    pub id: DbId,
    pub appliance_type: String,
    pub brand: String,
    pub model: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Appliance> for ApplianceInfo {
    fn from(appliance: Appliance) -> Self {
        ApplianceInfo {
            id: appliance.id,
            appliance_type: appliance.appliance_type,
            brand: appliance.brand,
            model: appliance.model,
        }
    }
}
