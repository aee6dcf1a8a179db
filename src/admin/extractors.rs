use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::{
    auth::{
        jwt::{token_from_headers, SessionKeys},
        repo_types::User,
    },
    error::AppError,
    state::AppState,
};

/// Signed-in user with `is_staff`. Anonymous requests get 401, others 403.
pub struct StaffUser;

#[async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let claims = SessionKeys::from_config(&state.config.session)
            .verify(&token)
            .map_err(|_| AppError::Unauthorized)?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;
        if !user.is_staff {
            warn!(user_id = %user.id, "non-staff user tried an admin listing");
            return Err(AppError::Forbidden);
        }
        Ok(StaffUser)
    }
}
