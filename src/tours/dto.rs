use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{ApiError, Result};

#[derive(Debug, Deserialize)]
pub struct CreateTourRequest {
    pub name: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub rating: Option<f64>,
    pub rating_average: Option<f64>,
    pub ratings_quantity: Option<i32>,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub start_dates: Vec<String>,
    #[serde(default)]
    pub secret_tour: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTourRequest {
    pub name: Option<String>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<String>,
    pub rating: Option<f64>,
    pub rating_average: Option<f64>,
    pub ratings_quantity: Option<i32>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
    pub secret_tour: Option<bool>,
}

/// Start dates arrive as RFC 3339 strings; a malformed one rejects the whole
/// request rather than being silently dropped.
pub fn parse_start_dates(raw: &[String]) -> Result<Vec<OffsetDateTime>> {
    raw.iter()
        .map(|s| {
            OffsetDateTime::parse(s, &Rfc3339).map_err(|_| ApiError::InvalidValue {
                field: "start_dates".into(),
                value: s.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_dates() {
        let dates = parse_start_dates(&[
            "2026-04-25T09:00:00Z".to_string(),
            "2026-07-20T09:00:00+02:00".to_string(),
        ])
        .unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].year(), 2026);
    }

    #[test]
    fn rejects_malformed_date() {
        let err = parse_start_dates(&["next tuesday".to_string()]).unwrap_err();
        assert!(err.to_string().contains("start_dates"));
    }
}
