use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::model::User;

/// Full column list for rows decoded into `User`, credential fields
/// included. Responses stay safe because serialization skips them.
const ALL_COLUMNS: &str = "id, name, email, photo, role, password_hash, \
     password_changed_at, password_reset_token, password_reset_expires, active, created_at";

impl User {
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        photo: Option<&str>,
        password_hash: &str,
    ) -> sqlx::Result<User> {
        let sql = format!(
            "INSERT INTO users (name, email, photo, password_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING {ALL_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(name)
            .bind(email)
            .bind(photo)
            .bind(password_hash)
            .fetch_one(db)
            .await
    }

    /// Lookup by email, soft-deleted principals excluded.
    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        let sql = format!("SELECT {ALL_COLUMNS} FROM users WHERE email = $1 AND active = TRUE");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await
    }

    /// Lookup by id, soft-deleted principals excluded.
    pub async fn find_active_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        let sql = format!("SELECT {ALL_COLUMNS} FROM users WHERE id = $1 AND active = TRUE");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Matches a pending reset by email and token digest; expired or
    /// consumed tokens never match because the expiry check is part of the
    /// query and consumption clears the columns.
    pub async fn find_by_reset_digest(
        db: &PgPool,
        email: &str,
        digest: &str,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&reset_lookup_sql())
            .bind(email)
            .bind(digest)
            .fetch_optional(db)
            .await
    }

    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        digest: &str,
        expires: OffsetDateTime,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token = $2, password_reset_expires = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .bind(expires)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token = NULL, password_reset_expires = NULL
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Stores a new password hash, clears any pending reset token and bumps
    /// the watermark. The watermark is backdated by one second so the token
    /// issued right after the change is not rejected as stale when both
    /// timestamps land in the same second.
    pub async fn set_password(db: &PgPool, id: Uuid, password_hash: &str) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>(&set_password_sql())
            .bind(id)
            .bind(password_hash)
            .fetch_one(db)
            .await
    }

    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        photo: Option<&str>,
    ) -> sqlx::Result<User> {
        let sql = format!(
            "UPDATE users
             SET name = COALESCE($2, name),
                 email = COALESCE($3, email),
                 photo = COALESCE($4, photo)
             WHERE id = $1
             RETURNING {ALL_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(name)
            .bind(email)
            .bind(photo)
            .fetch_one(db)
            .await
    }

    /// Soft delete: the row stays, active flips to false, and every
    /// active-only lookup stops seeing it.
    pub async fn deactivate(db: &PgPool, id: Uuid) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}

fn reset_lookup_sql() -> String {
    format!(
        "SELECT {ALL_COLUMNS} FROM users
         WHERE email = $1 AND password_reset_token = $2
           AND password_reset_expires > now() AND active = TRUE"
    )
}

fn set_password_sql() -> String {
    format!(
        "UPDATE users
         SET password_hash = $2,
             password_changed_at = now() - interval '1 second',
             password_reset_token = NULL,
             password_reset_expires = NULL
         WHERE id = $1
         RETURNING {ALL_COLUMNS}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_lookup_only_matches_pending_unexpired_tokens() {
        let sql = reset_lookup_sql();
        assert!(sql.contains("password_reset_token = $2"));
        assert!(sql.contains("password_reset_expires > now()"));
        assert!(sql.contains("active = TRUE"));
    }

    #[test]
    fn changing_the_password_consumes_the_reset_token() {
        // Consumption clears both reset columns in the same statement, so a
        // second attempt with the same token finds nothing to match.
        let sql = set_password_sql();
        assert!(sql.contains("password_reset_token = NULL"));
        assert!(sql.contains("password_reset_expires = NULL"));
        assert!(sql.contains("password_changed_at = now() - interval '1 second'"));
    }
}
