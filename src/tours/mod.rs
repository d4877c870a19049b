use axum::{
    routing::get,
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod model;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/tours",
            get(handlers::list_tours).post(handlers::create_tour),
        )
        .route("/tours/top-5-cheap", get(handlers::top_5_cheap))
        .route("/tours/stats", get(handlers::tour_stats))
        .route("/tours/monthly-plan/:year", get(handlers::monthly_plan))
        .route(
            "/tours/:id",
            get(handlers::get_tour)
                .patch(handlers::update_tour)
                .delete(handlers::delete_tour),
        )
}
