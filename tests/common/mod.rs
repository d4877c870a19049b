use axum::body::Body;
use axum::response::Response;
use axum::Router;
use serde_json::Value;

use tourbase::app::build_app;
use tourbase::state::AppState;

/// App wired against a lazily-connecting pool: anything that stays out of
/// the database (auth gate, validation, routing) can be exercised with
/// `tower::ServiceExt::oneshot`.
pub fn test_app() -> Router {
    build_app(AppState::fake())
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
