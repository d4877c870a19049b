use axum::{
    extract::{FromRef, Host, Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};

use crate::auth::dto::{
    ForgotPasswordRequest, ResetPasswordRequest, SigninRequest, SignupRequest, TokenResponse,
    UpdatePasswordRequest,
};
use crate::auth::gate::CurrentUser;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::{self, RESET_TOKEN_TTL};
use crate::error::{ApiError, Result};
use crate::response::MessageResponse;
use crate::state::AppState;
use crate::users::model::{validate_email, validate_password_pair, User};

/// Both the unknown-email and wrong-password cases answer with exactly this,
/// so a caller cannot learn which emails are registered.
const INVALID_CREDENTIALS: &str = "incorrect email or password";

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized(INVALID_CREDENTIALS.into())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("a user must have a name".into()));
    }
    validate_email(&payload.email)?;
    validate_password_pair(&payload.password, &payload.confirm_password)?;

    let hash = hash_password(&payload.password)?;
    // A concurrent signup with the same email loses on the unique index and
    // surfaces as a duplicate-field error.
    let user = User::create(
        &state.db,
        payload.name.trim(),
        &payload.email,
        payload.photo.as_deref(),
        &hash,
    )
    .await?;

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((StatusCode::CREATED, TokenResponse::new(token, user)))
}

#[instrument(skip(state, payload))]
pub async fn signin(
    State(state): State<AppState>,
    Json(mut payload): Json<SigninRequest>,
) -> Result<Json<TokenResponse>> {
    payload.email = payload.email.trim().to_lowercase();
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("email and password are required".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(user) => user,
        None => {
            warn!(email = %payload.email, "signin with unknown email");
            return Err(invalid_credentials());
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "signin with wrong password");
        return Err(invalid_credentials());
    }

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, "user signed in");
    Ok(TokenResponse::new(token, user))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Host(host): Host,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    validate_email(&email)?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("no account matches that email".into()))?;

    let reset = token::generate();
    let expires = time::OffsetDateTime::now_utc() + RESET_TOKEN_TTL;
    User::set_reset_token(&state.db, user.id, &reset.digest, expires).await?;

    let reset_url = format!(
        "http://{host}/api/v1/users/reset-password/{}&{}",
        reset.plain, user.email
    );
    let message = format!(
        "Forgot your password? Submit a PATCH request with your new password \
         and confirm_password to {reset_url}\n\
         If you didn't forget your password, simply ignore this email."
    );

    if let Err(err) = state
        .mailer
        .send(&user.email, "Your password reset token (valid for 10min)", &message)
        .await
    {
        // Never leave a token behind that was never delivered.
        if let Err(clear_err) = User::clear_reset_token(&state.db, user.id).await {
            tracing::error!(error = %clear_err, user_id = %user.id, "failed to roll back reset token");
        }
        return Err(ApiError::EmailDelivery(err));
    }

    info!(user_id = %user.id, "reset token sent");
    Ok(MessageResponse::success("token sent to email"))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token_and_email): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<TokenResponse>> {
    // The path segment carries "{token}&{email}".
    let (plain_token, email) = token_and_email
        .split_once('&')
        .ok_or_else(|| ApiError::Validation("reset link must contain token and email".into()))?;
    let email = email.trim().to_lowercase();

    validate_password_pair(&payload.password, &payload.confirm_password)?;

    let digest = token::digest_of(plain_token);
    let user = User::find_by_reset_digest(&state.db, &email, &digest)
        .await?
        .ok_or_else(|| ApiError::Validation("token is invalid or has expired".into()))?;

    let hash = hash_password(&payload.password)?;
    // Clears the reset token and bumps the watermark in the same statement.
    let user = User::set_password(&state.db, user.id, &hash).await?;

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, "password reset");
    Ok(TokenResponse::new(token, user))
}

#[instrument(skip(state, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<TokenResponse>> {
    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized("current password is not correct".into()));
    }
    validate_password_pair(&payload.new_password, &payload.confirm_new_password)?;

    let hash = hash_password(&payload.new_password)?;
    let user = User::set_password(&state.db, user.id, &hash).await?;

    // Tokens issued before this point are now behind the watermark; hand the
    // caller a fresh one.
    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, "password updated");
    Ok(TokenResponse::new(token, user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_email_and_wrong_password_reject_identically() {
        // Both signin failure branches go through the same constructor, so
        // status and message cannot drift apart.
        let unknown_email = invalid_credentials();
        let wrong_password = invalid_credentials();
        assert_eq!(unknown_email.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status_code(), wrong_password.status_code());
        assert_eq!(unknown_email.to_string(), wrong_password.to_string());
        assert_eq!(unknown_email.to_string(), "incorrect email or password");
    }
}
