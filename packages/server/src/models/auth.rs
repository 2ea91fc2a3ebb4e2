use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SessionResponse {
    pub id: i32,
    pub username: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

pub fn validate_login_request(req: &LoginRequest) -> Result<(), AppError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required".into(),
        ));
    }
    Ok(())
}
