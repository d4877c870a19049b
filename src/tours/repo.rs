use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Result;
use crate::query::QueryTranslator;
use crate::tours::dto::{CreateTourRequest, UpdateTourRequest};
use crate::tours::model::{attach_duration_weeks, Tour, Visibility, TOUR_COLUMNS};

const ALL_COLUMNS: &str = "id, name, slug, duration, max_group_size, difficulty, rating, \
     rating_average, ratings_quantity, price, price_discount, summary, description, \
     image_cover, images, created_at, start_dates, secret_tour";

/// One aggregation bucket per difficulty level.
#[derive(Debug, Serialize, FromRow)]
pub struct TourStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// One calendar month of a year's start dates, busiest months first.
#[derive(Debug, Serialize, FromRow)]
pub struct MonthlyPlanRow {
    pub month: i32,
    pub num_tour_starts: i64,
    pub tours: Vec<String>,
}

fn visibility_clause(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::PublicOnly => "AND secret_tour = FALSE",
        Visibility::IncludeSecret => "",
    }
}

impl Tour {
    pub async fn create(
        db: &PgPool,
        req: &CreateTourRequest,
        slug: &str,
        start_dates: &[OffsetDateTime],
    ) -> sqlx::Result<Tour> {
        let sql = format!(
            "INSERT INTO tours (name, slug, duration, max_group_size, difficulty, rating,
                 rating_average, ratings_quantity, price, price_discount, summary,
                 description, image_cover, images, start_dates, secret_tour)
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, 3.0), COALESCE($7, 2.7),
                 COALESCE($8, 0), $9, $10, $11, $12, $13, $14, $15, $16)
             RETURNING {ALL_COLUMNS}"
        );
        sqlx::query_as::<_, Tour>(&sql)
            .bind(req.name.trim())
            .bind(slug)
            .bind(req.duration)
            .bind(req.max_group_size)
            .bind(&req.difficulty)
            .bind(req.rating)
            .bind(req.rating_average)
            .bind(req.ratings_quantity)
            .bind(req.price)
            .bind(req.price_discount)
            .bind(req.summary.trim())
            .bind(req.description.as_deref())
            .bind(&req.image_cover)
            .bind(&req.images)
            .bind(start_dates)
            .bind(req.secret_tour)
            .fetch_one(db)
            .await
    }

    /// Fetch by id regardless of the secret flag; detail reads are allowed
    /// to see hidden tours.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<Tour>> {
        let sql = format!("SELECT {ALL_COLUMNS} FROM tours WHERE id = $1");
        sqlx::query_as::<_, Tour>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Partial update; absent fields keep their stored value. The slug is
    /// recomputed by the caller when the name changes, so it is passed in
    /// alongside the name.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        req: &UpdateTourRequest,
        slug: Option<&str>,
        start_dates: Option<Vec<OffsetDateTime>>,
    ) -> sqlx::Result<Option<Tour>> {
        let sql = format!(
            "UPDATE tours
             SET name = COALESCE($2, name),
                 slug = COALESCE($3, slug),
                 duration = COALESCE($4, duration),
                 max_group_size = COALESCE($5, max_group_size),
                 difficulty = COALESCE($6, difficulty),
                 rating = COALESCE($7, rating),
                 rating_average = COALESCE($8, rating_average),
                 ratings_quantity = COALESCE($9, ratings_quantity),
                 price = COALESCE($10, price),
                 price_discount = COALESCE($11, price_discount),
                 summary = COALESCE($12, summary),
                 description = COALESCE($13, description),
                 image_cover = COALESCE($14, image_cover),
                 images = COALESCE($15, images),
                 start_dates = COALESCE($16, start_dates),
                 secret_tour = COALESCE($17, secret_tour)
             WHERE id = $1
             RETURNING {ALL_COLUMNS}"
        );
        sqlx::query_as::<_, Tour>(&sql)
            .bind(id)
            .bind(req.name.as_deref().map(str::trim))
            .bind(slug)
            .bind(req.duration)
            .bind(req.max_group_size)
            .bind(req.difficulty.as_deref())
            .bind(req.rating)
            .bind(req.rating_average)
            .bind(req.ratings_quantity)
            .bind(req.price)
            .bind(req.price_discount)
            .bind(req.summary.as_deref())
            .bind(req.description.as_deref())
            .bind(req.image_cover.as_deref())
            .bind(req.images.as_deref())
            .bind(start_dates)
            .bind(req.secret_tour)
            .fetch_optional(db)
            .await
    }

    /// Hard delete. Returns whether a row existed.
    pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<bool> {
        let deleted: Option<(Uuid,)> = sqlx::query_as("DELETE FROM tours WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(deleted.is_some())
    }

    /// Query-string driven listing; each document carries the derived
    /// `duration_weeks` field when its projection kept `duration`.
    pub async fn list(
        db: &PgPool,
        params: &BTreeMap<String, String>,
        visibility: Visibility,
    ) -> Result<Vec<Value>> {
        let mut translator = QueryTranslator::new("tours", TOUR_COLUMNS);
        if visibility == Visibility::PublicOnly {
            translator = translator.constrain("secret_tour", "=", json!(false));
        }
        let mut docs = translator
            .filter(params)?
            .sort(params)?
            .project(params)?
            .paginate(params)
            .fetch_documents(db)
            .await?;
        for doc in &mut docs {
            attach_duration_weeks(doc);
        }
        Ok(docs)
    }

    /// Rating and price statistics bucketed by difficulty, restricted to
    /// tours with a rating average of at least 2.0, cheapest bucket first.
    pub async fn stats(db: &PgPool, visibility: Visibility) -> sqlx::Result<Vec<TourStats>> {
        sqlx::query_as::<_, TourStats>(&stats_sql(visibility))
            .fetch_all(db)
            .await
    }

    /// Per-month start counts for one calendar year, unnested from the
    /// start-date arrays. At most twelve rows, busiest months first.
    pub async fn monthly_plan(
        db: &PgPool,
        from: OffsetDateTime,
        to: OffsetDateTime,
        visibility: Visibility,
    ) -> sqlx::Result<Vec<MonthlyPlanRow>> {
        sqlx::query_as::<_, MonthlyPlanRow>(&monthly_plan_sql(visibility))
            .bind(from)
            .bind(to)
            .fetch_all(db)
            .await
    }
}

fn stats_sql(visibility: Visibility) -> String {
    format!(
        "SELECT upper(difficulty) AS difficulty,
                count(*) AS num_tours,
                sum(ratings_quantity)::bigint AS num_ratings,
                avg(rating_average) AS avg_rating,
                avg(price) AS avg_price,
                min(price) AS min_price,
                max(price) AS max_price
         FROM tours
         WHERE rating_average >= 2.0 {}
         GROUP BY difficulty
         ORDER BY avg_price",
        visibility_clause(visibility)
    )
}

fn monthly_plan_sql(visibility: Visibility) -> String {
    format!(
        "SELECT extract(month FROM d)::int AS month,
                count(*)::bigint AS num_tour_starts,
                array_agg(t.name ORDER BY t.name) AS tours
         FROM tours t
         CROSS JOIN LATERAL unnest(t.start_dates) AS d
         WHERE d >= $1 AND d < $2 {}
         GROUP BY month
         ORDER BY num_tour_starts DESC, month ASC
         LIMIT 12",
        visibility_clause(visibility)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregations_exclude_secret_tours() {
        assert!(stats_sql(Visibility::PublicOnly).contains("secret_tour = FALSE"));
        assert!(monthly_plan_sql(Visibility::PublicOnly).contains("secret_tour = FALSE"));
    }

    #[test]
    fn include_secret_drops_the_visibility_predicate() {
        assert!(!stats_sql(Visibility::IncludeSecret).contains("secret_tour"));
        assert!(!monthly_plan_sql(Visibility::IncludeSecret).contains("secret_tour"));
    }

    #[test]
    fn stats_only_count_reasonably_rated_tours() {
        assert!(stats_sql(Visibility::PublicOnly).contains("rating_average >= 2.0"));
    }

    #[test]
    fn monthly_plan_is_bounded_and_busiest_first() {
        let sql = monthly_plan_sql(Visibility::PublicOnly);
        assert!(sql.contains("ORDER BY num_tour_starts DESC"));
        assert!(sql.contains("LIMIT 12"));
    }
}
