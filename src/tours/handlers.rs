use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use time::{Date, Month, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::gate::{restrict_to, CurrentUser};
use crate::error::{ApiError, Result};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::tours::dto::{parse_start_dates, CreateTourRequest, UpdateTourRequest};
use crate::tours::model::{
    slugify, validate_new_tour, validate_tour_update, Tour, Visibility,
};
use crate::users::model::Role;

/// Only admins and lead guides may delete tours.
pub const DELETE_TOUR_ROLES: &[Role] = &[Role::Admin, Role::LeadGuide];

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidValue {
        field: "id".into(),
        value: raw.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn create_tour(
    State(state): State<AppState>,
    Json(payload): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>)> {
    validate_new_tour(&payload)?;
    let start_dates = parse_start_dates(&payload.start_dates)?;
    let slug = slugify(payload.name.trim());

    // A concurrent create with the same name loses on the unique index and
    // surfaces as a duplicate-field error.
    let tour = Tour::create(&state.db, &payload, &slug, &start_dates).await?;

    info!(tour_id = %tour.id, name = %tour.name, "tour created");
    let doc = tour.into_document()?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::success(json!({ "tour": doc })),
    ))
}

#[instrument(skip(state, _user))]
pub async fn list_tours(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<ApiResponse<Value>>> {
    let tours = Tour::list(&state.db, &params, Visibility::PublicOnly).await?;
    Ok(ApiResponse::with_results(tours.len(), json!({ "tours": tours })))
}

/// Canned listing: the five highest-rated tours, cheapest first among ties,
/// trimmed to the fields a landing page needs.
#[instrument(skip(state))]
pub async fn top_5_cheap(State(state): State<AppState>) -> Result<Json<ApiResponse<Value>>> {
    let params = BTreeMap::from([
        ("limit".to_string(), "5".to_string()),
        ("sort".to_string(), "-rating_average,price".to_string()),
        (
            "fields".to_string(),
            "name,price,rating_average,summary,difficulty".to_string(),
        ),
    ]);
    let tours = Tour::list(&state.db, &params, Visibility::PublicOnly).await?;
    Ok(ApiResponse::with_results(tours.len(), json!({ "tours": tours })))
}

#[instrument(skip(state))]
pub async fn tour_stats(State(state): State<AppState>) -> Result<Json<ApiResponse<Value>>> {
    let stats = Tour::stats(&state.db, Visibility::PublicOnly).await?;
    Ok(ApiResponse::success(json!({ "stats": stats })))
}

#[instrument(skip(state))]
pub async fn monthly_plan(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> Result<Json<ApiResponse<Value>>> {
    let year: i32 = year.parse().map_err(|_| ApiError::InvalidValue {
        field: "year".into(),
        value: year.clone(),
    })?;
    let (from, to) = year_bounds(year)?;

    let plan = Tour::monthly_plan(&state.db, from, to, Visibility::PublicOnly).await?;
    Ok(ApiResponse::success(json!({ "plan": plan })))
}

fn year_bounds(year: i32) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let start_of = |y: i32| -> Result<OffsetDateTime> {
        Date::from_calendar_date(y, Month::January, 1)
            .map(|d| d.midnight().assume_utc())
            .map_err(|_| ApiError::InvalidValue {
                field: "year".into(),
                value: y.to_string(),
            })
    };
    Ok((start_of(year)?, start_of(year + 1)?))
}

#[instrument(skip(state))]
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>> {
    let id = parse_id(&id)?;
    // Direct fetch sees secret tours; only listings and aggregations hide
    // them.
    let tour = Tour::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no tour found with ID:{id}")))?;
    let doc = tour.into_document()?;
    Ok(ApiResponse::success(json!({ "tour": doc })))
}

#[instrument(skip(state, payload))]
pub async fn update_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTourRequest>,
) -> Result<Json<ApiResponse<Value>>> {
    let id = parse_id(&id)?;
    let existing = Tour::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no tour found with ID:{id}")))?;

    validate_tour_update(&payload, &existing)?;

    let slug = payload.name.as_deref().map(|name| slugify(name.trim()));
    let start_dates = payload
        .start_dates
        .as_deref()
        .map(parse_start_dates)
        .transpose()?;

    let tour = Tour::update(&state.db, id, &payload, slug.as_deref(), start_dates)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no tour found with ID:{id}")))?;

    info!(tour_id = %tour.id, "tour updated");
    let doc = tour.into_document()?;
    Ok(ApiResponse::success(json!({ "tour": doc })))
}

#[instrument(skip(state, user))]
pub async fn delete_tour(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    // Role check runs before any storage access.
    restrict_to(&user, DELETE_TOUR_ROLES)?;

    let id = parse_id(&id)?;
    if !Tour::delete(&state.db, id).await? {
        return Err(ApiError::NotFound(format!("no tour found with ID:{id}")));
    }

    info!(tour_id = %id, deleted_by = %user.id, "tour deleted");
    Ok(StatusCode::NO_CONTENT)
}
