use axum::{
    routing::{patch, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod gate;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod token;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(handlers::signup))
        .route("/users/signin", post(handlers::signin))
        .route("/users/forgot-password", post(handlers::forgot_password))
        .route(
            "/users/reset-password/:token_and_email",
            patch(handlers::reset_password),
        )
        .route("/users/update-password", post(handlers::update_password))
}
