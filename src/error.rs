use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::config::{self, Environment};

/// Application error type. Every handler funnels failures through this enum
/// so clients always see the same `{status, message}` envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("duplicate field value: {value} in key: {field}, please use another value")]
    DuplicateField { field: String, value: String },

    #[error("{0}")]
    Unauthorized(String),

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("there was an error sending the email, try again later")]
    EmailDelivery(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidValue { .. }
            | ApiError::DuplicateField { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::EmailDelivery(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error envelope: `status` is "fail" for 4xx and "error" for 5xx.
#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiError {
    /// Client-facing message and optional debug detail for a deployment
    /// mode. Operational errors keep their message in every mode; only
    /// unclassified internal errors collapse to a generic message outside
    /// development. The underlying cause rides along as `error` in
    /// development only.
    fn client_parts(&self, env: Environment) -> (String, Option<String>) {
        match (self, env) {
            (ApiError::Internal(_), Environment::Production) => {
                ("something went very wrong".to_string(), None)
            }
            (ApiError::Internal(err), Environment::Development)
            | (ApiError::EmailDelivery(err), Environment::Development) => {
                (self.to_string(), Some(format!("{err:?}")))
            }
            _ => (self.to_string(), None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let status_label = if status.is_client_error() {
            "fail"
        } else {
            "error"
        };

        match &self {
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "unhandled internal error");
            }
            ApiError::EmailDelivery(err) => {
                tracing::error!(error = %err, "email delivery failed");
            }
            _ => {}
        }

        let (message, error) = self.client_parts(config::environment());

        let body = ErrorBody {
            status: status_label,
            message,
            error,
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::NotFound("record not found".into()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                let detail = db
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .and_then(|pg| pg.detail());
                let (field, value) = parse_unique_violation(detail, db.constraint());
                ApiError::DuplicateField { field, value }
            }
            _ => ApiError::Internal(err.into()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        let message = match err.kind() {
            ErrorKind::ExpiredSignature => "token has expired, please log in again",
            ErrorKind::ImmatureSignature => {
                "invalid request time, please use UTC time for the request header"
            }
            _ => "invalid web token, please log in again",
        };
        ApiError::Unauthorized(message.into())
    }
}

/// Pulls the offending field and value out of a unique-violation error.
/// Postgres reports `Key (name)=(Forest Hiker) already exists.` in the detail;
/// the constraint name is the fallback when the detail is unavailable.
fn parse_unique_violation(detail: Option<&str>, constraint: Option<&str>) -> (String, String) {
    lazy_static! {
        static ref KEY_RE: Regex = Regex::new(r"Key \(([^)]+)\)=\((.*)\) already exists").unwrap();
    }
    if let Some(caps) = detail.and_then(|d| KEY_RE.captures(d)) {
        return (caps[1].to_string(), caps[2].to_string());
    }
    (
        constraint.unwrap_or("unknown").to_string(),
        String::new(),
    )
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_detail_names_field_and_value() {
        let (field, value) = parse_unique_violation(
            Some("Key (name)=(The Forest Hiker) already exists."),
            Some("tours_name_key"),
        );
        assert_eq!(field, "name");
        assert_eq!(value, "The Forest Hiker");
    }

    #[test]
    fn unique_violation_falls_back_to_constraint_name() {
        let (field, value) = parse_unique_violation(None, Some("users_email_key"));
        assert_eq!(field, "users_email_key");
        assert_eq!(value, "");
    }

    #[test]
    fn client_errors_use_fail_status() {
        let err = ApiError::Validation("bad input".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = ApiError::Forbidden;
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn email_delivery_keeps_its_message_in_production() {
        let err = ApiError::EmailDelivery(anyhow::anyhow!("smtp connection refused"));
        let (message, detail) = err.client_parts(Environment::Production);
        assert_eq!(message, "there was an error sending the email, try again later");
        assert!(detail.is_none());
    }

    #[test]
    fn internal_errors_are_masked_in_production_only() {
        let err = ApiError::Internal(anyhow::anyhow!("pool exhausted"));
        let (message, detail) = err.client_parts(Environment::Production);
        assert_eq!(message, "something went very wrong");
        assert!(detail.is_none());

        let (message, detail) = err.client_parts(Environment::Development);
        assert_eq!(message, "pool exhausted");
        assert!(detail.expect("dev detail").contains("pool exhausted"));
    }

    #[test]
    fn jwt_expiry_maps_to_its_own_message() {
        let err = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::ExpiredSignature,
        );
        match ApiError::from(err) {
            ApiError::Unauthorized(msg) => assert!(msg.contains("expired")),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }
}
