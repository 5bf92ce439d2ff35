//! Zero-sized repository structs with async query methods.
//!
//! Every method takes `&PgPool` (or a connection inside a transaction owned
//! by a sibling repository) and returns `Result<_, sqlx::Error>`.

pub mod alternative_date_repo;
pub mod appliance_repo;
pub mod offer_repo;
pub mod service_request_repo;
pub mod technician_specialty_repo;
pub mod user_repo;

pub use alternative_date_repo::AlternativeDateRepo;
pub use appliance_repo::ApplianceRepo;
pub use offer_repo::OfferRepo;
pub use service_request_repo::{ClosedTransition, ServiceRequestRepo};
pub use technician_specialty_repo::TechnicianSpecialtyRepo;
pub use user_repo::UserRepo;
