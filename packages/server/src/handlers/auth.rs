use axum::Json;
use axum::extract::State;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use sea_orm::*;
use tracing::instrument;

use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AdminUser, SESSION_COOKIE};
use crate::extractors::json::AppJson;
use crate::models::auth::{LoginRequest, LogoutResponse, SessionResponse, validate_login_request};
use crate::state::AppState;
use crate::utils::{hash, session};

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in",
    description = "Verifies admin credentials and sets the HttpOnly session cookie.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established", body = SessionResponse),
        (status = 400, description = "Missing credentials (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Bad credentials (INVALID_CREDENTIALS)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, jar, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    validate_login_request(&payload)?;

    let found = user::Entity::find()
        .filter(user::Column::Username.eq(payload.username.trim()))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    // A malformed stored hash verifies as false rather than leaking a 500.
    if !hash::verify_password(&payload.password, &found.password).unwrap_or(false) {
        return Err(AppError::InvalidCredentials);
    }

    let token = session::sign(
        found.id,
        &found.username,
        state.config.auth.session_ttl_hours,
        &state.config.auth.session_secret,
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign session token: {e}")))?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(state.config.auth.session_ttl_hours))
        .build();

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            id: found.id,
            username: found.username,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    operation_id = "logout",
    summary = "Log out",
    description = "Clears the session cookie.",
    responses((status = 200, description = "Session cleared", body = LogoutResponse)),
)]
#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");

    (
        jar.remove(cookie),
        Json(LogoutResponse {
            message: "Logged out".into(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    operation_id = "currentSession",
    summary = "Current session",
    description = "Returns the logged-in admin, or 401 when the session is missing or invalid.",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 401, description = "Unauthorized (SESSION_MISSING, SESSION_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(admin), fields(username = %admin.username))]
pub async fn me(admin: AdminUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        id: admin.user_id,
        username: admin.username,
    })
}
