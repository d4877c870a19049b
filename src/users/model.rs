use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, Result};

/// Columns exposed through listings and query projection. Credential and
/// bookkeeping columns are deliberately absent.
pub const USER_COLUMNS: &[&str] = &["id", "name", "email", "photo", "role", "created_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "user" => Some(Role::User),
            "guide" => Some(Role::Guide),
            "lead-guide" => Some(Role::LeadGuide),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// User record. The credential columns are selected for internal flows but
/// never serialized into a response.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::User)
    }

    /// Whether the password-change watermark postdates a token issued at
    /// `token_iat` (unix seconds). Such tokens are stale and must be
    /// rejected even if unexpired.
    pub fn changed_password_after(&self, token_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => token_iat < changed_at.unix_timestamp(),
            None => false,
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Structural checks for a new password pair, shared by signup, reset and
/// update-password. The confirmation never reaches the database.
pub fn validate_password_pair(password: &str, confirm: &str) -> Result<()> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if password != confirm {
        return Err(ApiError::Validation(
            "password and confirm_password do not match".into(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    if !is_valid_email(email) {
        return Err(ApiError::Validation(format!("{email} is not a valid email")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_watermark(changed_at: Option<OffsetDateTime>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: "test@example.com".into(),
            photo: None,
            role: "user".into(),
            password_hash: "$argon2id$fake".into(),
            password_changed_at: changed_at,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn token_issued_before_watermark_is_stale() {
        let changed = OffsetDateTime::now_utc();
        let user = user_with_watermark(Some(changed));
        assert!(user.changed_password_after(changed.unix_timestamp() - 60));
        assert!(!user.changed_password_after(changed.unix_timestamp() + 60));
    }

    #[test]
    fn missing_watermark_never_invalidates() {
        let user = user_with_watermark(None);
        assert!(!user.changed_password_after(0));
    }

    #[test]
    fn role_parsing_covers_the_enumeration() {
        assert_eq!(Role::parse("lead-guide"), Some(Role::LeadGuide));
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("gm"), None);
    }

    #[test]
    fn unknown_role_defaults_to_user() {
        let mut user = user_with_watermark(None);
        user.role = "superuser".into();
        assert_eq!(user.role(), Role::User);
    }

    #[test]
    fn serialized_user_never_exposes_credentials() {
        let user = user_with_watermark(Some(OffsetDateTime::now_utc()));
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("active"));
        assert!(json.contains("test@example.com"));
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("guide@tourbase.io"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("spaces in@mail.com"));
    }

    #[test]
    fn password_pair_rules() {
        assert!(validate_password_pair("longenough", "longenough").is_ok());
        assert!(validate_password_pair("short", "short").is_err());
        assert!(validate_password_pair("longenough", "different!").is_err());
    }
}
