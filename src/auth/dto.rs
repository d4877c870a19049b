use axum::Json;
use serde::{Deserialize, Serialize};

use crate::users::model::User;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub photo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

/// Issued-credential envelope: `{status, token, data: {user}}`. The user's
/// credential columns are skipped by its Serialize impl.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub status: &'static str,
    pub token: String,
    pub data: TokenData,
}

#[derive(Debug, Serialize)]
pub struct TokenData {
    pub user: User,
}

impl TokenResponse {
    pub fn new(token: String, user: User) -> Json<Self> {
        Json(Self {
            status: "success",
            token,
            data: TokenData { user },
        })
    }
}
