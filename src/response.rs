use axum::Json;
use serde::Serialize;

/// Success envelope: `{status: "success", results?, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            results: None,
            data,
        })
    }

    /// List responses also carry the number of returned records.
    pub fn with_results(results: usize, data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            results: Some(results),
            data,
        })
    }
}

/// Success envelope without a data payload, e.g. "token sent to email".
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
        })
    }
}
