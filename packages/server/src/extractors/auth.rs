use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::session;

/// Name of the admin session cookie.
pub const SESSION_COOKIE: &str = "mb_session";

/// Authenticated admin extracted from the session cookie.
///
/// Add this as a handler parameter to gate an endpoint behind login.
pub struct AdminUser {
    pub user_id: i32,
    pub username: String,
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_owned())
            .ok_or(AppError::SessionMissing)?;

        let claims = session::verify(&token, &state.config.auth.session_secret)
            .map_err(|_| AppError::SessionInvalid)?;

        Ok(AdminUser {
            user_id: claims.uid,
            username: claims.sub,
        })
    }
}
