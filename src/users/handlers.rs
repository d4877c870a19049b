use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::auth::gate::CurrentUser;
use crate::error::{ApiError, Result};
use crate::query::QueryTranslator;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::users::model::{validate_email, User, USER_COLUMNS};

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    // Present only to reject password changes on this route.
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

#[instrument(skip(state, _user))]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<ApiResponse<Value>>> {
    // Soft-deleted principals are excluded by an explicit constraint, not an
    // ambient hook.
    let users = QueryTranslator::new("users", USER_COLUMNS)
        .constrain("active", "=", json!(true))
        .filter(&params)?
        .sort(&params)?
        .project(&params)?
        .paginate(&params)
        .fetch_documents(&state.db)
        .await?;

    Ok(ApiResponse::with_results(users.len(), json!({ "users": users })))
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<ApiResponse<Value>>> {
    if payload.password.is_some() || payload.confirm_password.is_some() {
        return Err(ApiError::Validation(
            "this route is not for password updates, use /users/update-password".into(),
        ));
    }

    let email = match payload.email {
        Some(raw) => {
            let email = raw.trim().to_lowercase();
            validate_email(&email)?;
            Some(email)
        }
        None => None,
    };

    let updated = User::update_profile(
        &state.db,
        user.id,
        payload.name.as_deref(),
        email.as_deref(),
        payload.photo.as_deref(),
    )
    .await?;

    info!(user_id = %updated.id, "profile updated");
    Ok(ApiResponse::success(json!({ "user": updated })))
}

#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode> {
    User::deactivate(&state.db, user.id).await?;
    info!(user_id = %user.id, "user deactivated");
    Ok(StatusCode::NO_CONTENT)
}
