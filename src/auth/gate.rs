use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::model::{Role, User};

/// Access gate: extracts and verifies the bearer credential, resolves it to
/// an active principal and checks the password-change watermark. Rejection
/// checks run in a fixed, observable order; on success the resolved user is
/// attached to the handler.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // 1. A credential must be presented at all.
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing authorization header".into()))?;

        // 2. And presented under the expected scheme.
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("authorization header must use the Bearer scheme".into())
        })?;

        // 3. Signature and expiry. The error kind picks the 401 message.
        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token)?;

        // 4. The principal must still exist and not be soft-deleted.
        let user = User::find_active_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| {
                ApiError::Unauthorized("the user belonging to this token no longer exists".into())
            })?;

        // 5. Tokens issued before the last password change are stale.
        if user.changed_password_after(claims.iat as i64) {
            return Err(ApiError::Unauthorized(
                "password was changed after this token was issued, please log in again".into(),
            ));
        }

        Ok(CurrentUser(user))
    }
}

/// Role restriction, applied after the gate has attached a principal. Routes
/// declare their allow-list as const metadata and hand it to this one check.
pub fn restrict_to(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role()) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user_with_role(role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Gate Test".into(),
            email: "gate@example.com".into(),
            photo: None,
            role: role.into(),
            password_hash: "$argon2id$fake".into(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn allowed_role_passes() {
        let admin = user_with_role("admin");
        assert!(restrict_to(&admin, &[Role::Admin, Role::LeadGuide]).is_ok());
    }

    #[test]
    fn disallowed_role_is_forbidden() {
        let guide = user_with_role("guide");
        match restrict_to(&guide, &[Role::Admin, Role::LeadGuide]) {
            Err(ApiError::Forbidden) => {}
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn unknown_role_is_treated_as_plain_user() {
        let odd = user_with_role("superuser");
        assert!(restrict_to(&odd, &[Role::User]).is_ok());
        assert!(restrict_to(&odd, &[Role::Admin]).is_err());
    }
}
