pub mod alternative_date;
pub mod offer;
pub mod service_request;

use repairlink_core::error::CoreError;
use repairlink_db::models::service_request::ServiceRequest;
use repairlink_db::models::status::RequestStatus;
use repairlink_negotiation::LifecycleEngine;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;

/// Read access to a request: admins, the owning client, the assigned
/// technician, and technicians whose specialties cover the appliance while
/// the request is still open for offers.
pub(crate) async fn ensure_can_view(
    engine: &LifecycleEngine,
    user: &AuthUser,
    request: &ServiceRequest,
) -> AppResult<()> {
    let visible = if user.is_admin() {
        true
    } else if user.is_client() {
        request.is_owned_by(user.user_id)
    } else if user.is_technician() {
        request.is_assigned_to(user.user_id)
            || (request.status().is_some_and(RequestStatus::is_open)
                && engine.serves(user.user_id, request).await?)
    } else {
        false
    };

    if visible {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "Not allowed to view service request {}",
            request.id
        ))
        .into())
    }
}
