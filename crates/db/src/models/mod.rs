//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - Insert DTOs built by the negotiation engine
//! - `Deserialize` request bodies accepted by the API

pub mod alternative_date;
pub mod directory;
pub mod offer;
pub mod service_request;
pub mod status;
