use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::tours::dto::{CreateTourRequest, UpdateTourRequest};

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];

/// Columns exposed through listings and query projection.
pub const TOUR_COLUMNS: &[&str] = &[
    "id",
    "name",
    "slug",
    "duration",
    "max_group_size",
    "difficulty",
    "rating",
    "rating_average",
    "ratings_quantity",
    "price",
    "price_discount",
    "summary",
    "description",
    "image_cover",
    "images",
    "created_at",
    "start_dates",
    "secret_tour",
];

/// Whether a read should see secret tours. Threaded explicitly through every
/// listing and aggregation call so the exclusion stays auditable; only
/// fetch-by-id passes `IncludeSecret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    PublicOnly,
    IncludeSecret,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub rating: f64,
    pub rating_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(serialize_with = "serialize_rfc3339_vec")]
    pub start_dates: Vec<OffsetDateTime>,
    pub secret_tour: bool,
}

impl Tour {
    /// JSON document for responses, with the derived `duration_weeks` field
    /// (never stored) attached.
    pub fn into_document(self) -> Result<Value> {
        let mut doc = serde_json::to_value(&self).context("serialize tour")?;
        attach_duration_weeks(&mut doc);
        Ok(doc)
    }
}

/// Adds `duration_weeks = duration / 7` to a tour document when the
/// projection kept the duration field.
pub fn attach_duration_weeks(doc: &mut Value) {
    if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
        doc["duration_weeks"] = json!(duration / 7.0);
    }
}

fn serialize_rfc3339_vec<S>(dates: &[OffsetDateTime], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::{Error, SerializeSeq};
    use time::format_description::well_known::Rfc3339;

    let mut seq = serializer.serialize_seq(Some(dates.len()))?;
    for date in dates {
        let formatted = date.format(&Rfc3339).map_err(S::Error::custom)?;
        seq.serialize_element(&formatted)?;
    }
    seq.end()
}

/// Derived from the name on create and on rename; never supplied by clients.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Explicit before-persist validation for a new tour. Failures are
/// aggregated into one message.
pub fn validate_new_tour(req: &CreateTourRequest) -> Result<()> {
    let mut errors = Vec::new();
    check_name(Some(&req.name), &mut errors);
    check_difficulty(Some(&req.difficulty), &mut errors);
    check_ratings(req.rating, req.rating_average, &mut errors);
    check_discount(req.price_discount, req.price, &mut errors);
    if req.duration <= 0 {
        errors.push("duration must be positive".into());
    }
    if req.max_group_size <= 0 {
        errors.push("max_group_size must be positive".into());
    }
    if req.summary.trim().is_empty() {
        errors.push("a tour must have a summary".into());
    }
    if req.image_cover.trim().is_empty() {
        errors.push("a tour must have a cover image".into());
    }
    finish(errors)
}

/// Before-persist validation for a partial update, checked against the
/// stored row so cross-field invariants (discount < price) hold for the
/// merged result.
pub fn validate_tour_update(req: &UpdateTourRequest, existing: &Tour) -> Result<()> {
    let mut errors = Vec::new();
    check_name(req.name.as_deref(), &mut errors);
    check_difficulty(req.difficulty.as_deref(), &mut errors);
    check_ratings(req.rating, req.rating_average, &mut errors);

    let price = req.price.unwrap_or(existing.price);
    let discount = req.price_discount.or(existing.price_discount);
    check_discount(discount, price, &mut errors);

    if matches!(req.duration, Some(d) if d <= 0) {
        errors.push("duration must be positive".into());
    }
    if matches!(req.max_group_size, Some(s) if s <= 0) {
        errors.push("max_group_size must be positive".into());
    }
    finish(errors)
}

fn check_name(name: Option<&str>, errors: &mut Vec<String>) {
    if let Some(name) = name {
        let len = name.trim().chars().count();
        if !(5..=40).contains(&len) {
            errors.push("a tour name must have between 5 and 40 characters".into());
        }
    }
}

fn check_difficulty(difficulty: Option<&str>, errors: &mut Vec<String>) {
    if let Some(difficulty) = difficulty {
        if !DIFFICULTIES.contains(&difficulty) {
            errors.push("difficulty must be one of: easy, medium, difficult".into());
        }
    }
}

fn check_ratings(rating: Option<f64>, rating_average: Option<f64>, errors: &mut Vec<String>) {
    if matches!(rating, Some(r) if !(0.0..=5.0).contains(&r)) {
        errors.push("rating must be between 0 and 5".into());
    }
    if matches!(rating_average, Some(r) if !(1.0..=5.0).contains(&r)) {
        errors.push("rating_average must be between 1 and 5".into());
    }
}

fn check_discount(discount: Option<f64>, price: f64, errors: &mut Vec<String>) {
    if matches!(discount, Some(d) if d >= price) {
        errors.push("price_discount must be lower than price".into());
    }
}

fn finish(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "please correct the following errors: {}",
            errors.join("; ")
        )))
    }
}
