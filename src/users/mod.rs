use axum::{
    routing::{delete, get, patch},
    Router,
};

use crate::state::AppState;

pub mod handlers;
pub mod model;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::list_users))
        .route("/users/update-me", patch(handlers::update_me))
        .route("/users/delete-me", delete(handlers::delete_me))
}
