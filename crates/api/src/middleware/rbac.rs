//! Role-based access control (RBAC) extractors.
//!
//! Each extractor wraps [`AuthUser`] and rejects requests whose token role
//! does not match. The lifecycle engine re-checks the role against the
//! identity directory, so a stale token cannot outlive a role change.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use repairlink_core::error::CoreError;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the `client` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn client_only(RequireClient(user): RequireClient) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireClient(pub AuthUser);

impl FromRequestParts<AppState> for RequireClient {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_client() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Client role required".into(),
            )));
        }
        Ok(RequireClient(user))
    }
}

/// Requires the `technician` role. Rejects with 403 Forbidden otherwise.
pub struct RequireTechnician(pub AuthUser);

impl FromRequestParts<AppState> for RequireTechnician {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_technician() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Technician role required".into(),
            )));
        }
        Ok(RequireTechnician(user))
    }
}
