use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use sqlx::PgPool;

use crate::error::{ApiError, Result};

/// Query-string keys that drive query shaping rather than filtering.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

const DEFAULT_LIMIT: i64 = 100;

/// Translates an untyped query-string mapping into a single SQL query over
/// one table. Steps are applied fluently in a fixed order — filter, sort,
/// project, paginate — and the result is executed exactly once, returning
/// rows as JSON documents so field projection happens inside the engine.
///
/// Mandatory base constraints (hidden-record exclusion, active-only lookups)
/// are threaded in explicitly via [`QueryTranslator::constrain`]; there is no
/// ambient default filter.
pub struct QueryTranslator {
    table: &'static str,
    public_columns: &'static [&'static str],
    columns: Vec<String>,
    wheres: Vec<String>,
    params: Vec<Value>,
    order_by: Vec<String>,
    limit: i64,
    offset: Option<i64>,
}

impl QueryTranslator {
    pub fn new(table: &'static str, public_columns: &'static [&'static str]) -> Self {
        Self {
            table,
            public_columns,
            columns: public_columns.iter().map(|c| c.to_string()).collect(),
            wheres: Vec::new(),
            params: Vec::new(),
            order_by: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: None,
        }
    }

    /// Adds a caller-mandated constraint, e.g. `secret_tour = false`. The
    /// column and operator are trusted literals; only the value is bound.
    pub fn constrain(mut self, column: &str, operator: &str, value: Value) -> Self {
        let placeholder = self.push_param(value);
        self.wheres.push(format!("{column} {operator} {placeholder}"));
        self
    }

    /// Step 1: every non-reserved key becomes an equality or comparison
    /// constraint. Bracketed keys (`price[lt]=500`) parse into nested
    /// constraint objects, whose `gte/gt/lte/lt` keys are rewritten to
    /// comparison operators before any SQL is built.
    pub fn filter(mut self, params: &BTreeMap<String, String>) -> Result<Self> {
        let constraints = parse_constraints(params)?;
        let rewritten = rewrite_comparison_keys(Value::Object(constraints));
        let Value::Object(fields) = rewritten else {
            unreachable!("rewrite preserves the object shape");
        };

        for (field, constraint) in fields {
            self.ensure_column(&field)?;
            match constraint {
                Value::Object(operators) => {
                    for (operator, raw) in operators {
                        let sql_operator = comparison_operator(&operator).ok_or_else(|| {
                            ApiError::Validation(format!(
                                "unsupported operator {operator} on field {field}"
                            ))
                        })?;
                        if raw.is_object() || raw.is_array() {
                            return Err(ApiError::Validation(format!(
                                "constraint on field {field} nests too deeply"
                            )));
                        }
                        let placeholder = self.push_param(raw);
                        self.wheres
                            .push(format!("{field} {sql_operator} {placeholder}"));
                    }
                }
                scalar => {
                    let placeholder = self.push_param(scalar);
                    self.wheres.push(format!("{field} = {placeholder}"));
                }
            }
        }
        Ok(self)
    }

    /// Step 2: comma-separated sort fields, `-` prefix for descending,
    /// priority in listed order. Defaults to newest first.
    pub fn sort(mut self, params: &BTreeMap<String, String>) -> Result<Self> {
        if let Some(raw) = params.get("sort") {
            for part in raw.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let (column, direction) = match part.strip_prefix('-') {
                    Some(column) => (column, "DESC"),
                    None => (part, "ASC"),
                };
                self.ensure_column(column)?;
                self.order_by.push(format!("{column} {direction}"));
            }
        }
        if self.order_by.is_empty() {
            self.order_by.push("created_at DESC".to_string());
        }
        Ok(self)
    }

    /// Step 3: comma-separated allow-list of fields to include. The default
    /// is the collection's public column set, which already excludes
    /// bookkeeping and credential columns.
    pub fn project(mut self, params: &BTreeMap<String, String>) -> Result<Self> {
        if let Some(raw) = params.get("fields") {
            let mut columns = Vec::new();
            for field in raw.split(',') {
                let field = field.trim();
                if field.is_empty() {
                    continue;
                }
                self.ensure_column(field)?;
                columns.push(field.to_string());
            }
            if !columns.is_empty() {
                self.columns = columns;
            }
        }
        Ok(self)
    }

    /// Step 4: `limit` bounds the page size (default 100); `page` is
    /// 1-indexed and absent means no skip. Non-numeric values fall back to
    /// the defaults rather than failing.
    pub fn paginate(mut self, params: &BTreeMap<String, String>) -> Self {
        let limit = params
            .get("limit")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT);
        self.limit = limit;
        // Both operands are caller-controlled; an offset too large to
        // compute degrades to no skip, same as a non-numeric page.
        self.offset = params
            .get("page")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .and_then(|page| (page - 1).checked_mul(limit));
        self
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.table);
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        if self.order_by.is_empty() {
            sql.push_str(" ORDER BY created_at DESC");
        } else {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        sql.push_str(&format!(" LIMIT {}", self.limit));
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        sql
    }

    #[cfg(test)]
    fn bound_params(&self) -> &[Value] {
        &self.params
    }

    /// Executes the refined query once, returning rows as JSON documents.
    pub async fn fetch_documents(self, db: &PgPool) -> Result<Vec<Value>> {
        let sql = format!(
            "SELECT row_to_json(sub) AS doc FROM ({}) AS sub",
            self.to_sql()
        );
        let mut query = sqlx::query_scalar::<_, Value>(&sql);
        for value in &self.params {
            query = bind_value(query, value);
        }
        let docs = query.fetch_all(db).await.map_err(ApiError::from)?;
        Ok(docs)
    }

    fn push_param(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn ensure_column(&self, name: &str) -> Result<()> {
        if self.public_columns.contains(&name) {
            Ok(())
        } else {
            Err(ApiError::Validation(format!(
                "unknown field in query: {name}"
            )))
        }
    }
}

/// Rewrites `gte/gt/lte/lt` object keys into `$`-prefixed comparison
/// operators, at any nesting depth.
pub fn rewrite_comparison_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let rewritten = map
                .into_iter()
                .map(|(key, inner)| {
                    let key = match key.as_str() {
                        "gte" => "$gte".to_string(),
                        "gt" => "$gt".to_string(),
                        "lte" => "$lte".to_string(),
                        "lt" => "$lt".to_string(),
                        _ => key,
                    };
                    (key, rewrite_comparison_keys(inner))
                })
                .collect();
            Value::Object(rewritten)
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(rewrite_comparison_keys).collect())
        }
        other => other,
    }
}

fn comparison_operator(key: &str) -> Option<&'static str> {
    match key {
        "$gte" => Some(">="),
        "$gt" => Some(">"),
        "$lte" => Some("<="),
        "$lt" => Some("<"),
        _ => None,
    }
}

/// Builds the nested constraint mapping from flat query-string pairs,
/// dropping reserved keys. `duration[gte]=5` becomes `{duration: {gte: 5}}`.
fn parse_constraints(params: &BTreeMap<String, String>) -> Result<Map<String, Value>> {
    let mut root = Map::new();
    for (key, raw) in params {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let segments = split_key(key)?;
        insert_path(&mut root, &segments, scalar_value(raw));
    }
    Ok(root)
}

/// Splits `a[b][c]` into `["a", "b", "c"]`; rejects unbalanced brackets.
fn split_key(key: &str) -> Result<Vec<&str>> {
    let malformed = || ApiError::Validation(format!("malformed query key: {key}"));

    let (head, rest) = match key.find('[') {
        Some(open) => key.split_at(open),
        None => return Ok(vec![key]),
    };
    if head.is_empty() {
        return Err(malformed());
    }

    let mut segments = vec![head];
    let mut rest = rest;
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[').ok_or_else(malformed)?;
        let close = inner.find(']').ok_or_else(malformed)?;
        let segment = &inner[..close];
        if segment.is_empty() {
            return Err(malformed());
        }
        segments.push(segment);
        rest = &inner[close + 1..];
    }
    Ok(segments)
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            map.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

/// Query-string values are strings; bind them as the narrowest type that
/// round-trips so numeric comparisons use numeric parameters.
fn scalar_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = raw.parse::<f64>() {
        if let Some(number) = Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

type DocQuery<'q> =
    sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments>;

fn bind_value<'q>(query: DocQuery<'q>, value: &'q Value) -> DocQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                query.bind(int)
            } else if let Some(float) = n.as_f64() {
                query.bind(float)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s),
        other => query.bind(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &[
        "id",
        "name",
        "duration",
        "difficulty",
        "price",
        "rating_average",
        "created_at",
    ];

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn translator() -> QueryTranslator {
        QueryTranslator::new("tours", COLUMNS)
    }

    #[test]
    fn reserved_only_mapping_yields_unfiltered_query() {
        let q = params(&[("page", "1"), ("sort", "price"), ("limit", "10"), ("fields", "name")]);
        let t = translator().filter(&q).unwrap();
        assert!(!t.to_sql().contains("WHERE"));
        assert!(t.bound_params().is_empty());
    }

    #[test]
    fn plain_keys_become_equality_constraints() {
        let q = params(&[("difficulty", "easy")]);
        let t = translator().filter(&q).unwrap();
        assert!(t.to_sql().contains("WHERE difficulty = $1"));
        assert_eq!(t.bound_params(), &[json!("easy")]);
    }

    #[test]
    fn bracketed_keys_become_comparison_constraints() {
        let q = params(&[("duration", "5"), ("price[lt]", "1500"), ("price[gte]", "400")]);
        let t = translator().filter(&q).unwrap();
        let sql = t.to_sql();
        assert!(sql.contains("duration = $1"));
        assert!(sql.contains("price >= $2"));
        assert!(sql.contains("price < $3"));
        assert_eq!(t.bound_params(), &[json!(5), json!(400), json!(1500)]);
    }

    #[test]
    fn rewrite_reaches_arbitrary_depth() {
        let nested = json!({
            "a": { "gte": 1 },
            "b": { "c": { "d": { "lt": 2 } } },
            "list": [ { "lte": 3 } ]
        });
        let rewritten = rewrite_comparison_keys(nested);
        assert_eq!(
            rewritten,
            json!({
                "a": { "$gte": 1 },
                "b": { "c": { "d": { "$lt": 2 } } },
                "list": [ { "$lte": 3 } ]
            })
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let q = params(&[("password_hash", "x")]);
        assert!(translator().filter(&q).is_err());
    }

    #[test]
    fn deeply_nested_constraint_is_rejected_at_build_time() {
        let q = params(&[("price[a][gte]", "1")]);
        assert!(translator().filter(&q).is_err());
    }

    #[test]
    fn sort_parses_direction_and_priority() {
        let q = params(&[("sort", "-rating_average,price")]);
        let t = translator().sort(&q).unwrap();
        assert!(t
            .to_sql()
            .contains("ORDER BY rating_average DESC, price ASC"));
    }

    #[test]
    fn sort_defaults_to_newest_first() {
        let t = translator().sort(&params(&[])).unwrap();
        assert!(t.to_sql().contains("ORDER BY created_at DESC"));
    }

    #[test]
    fn projection_defaults_to_public_columns() {
        let t = translator().project(&params(&[])).unwrap();
        assert!(t.to_sql().starts_with(
            "SELECT id, name, duration, difficulty, price, rating_average, created_at FROM tours"
        ));
    }

    #[test]
    fn projection_honours_field_list() {
        let q = params(&[("fields", "name,price")]);
        let t = translator().project(&q).unwrap();
        assert!(t.to_sql().starts_with("SELECT name, price FROM tours"));
    }

    #[test]
    fn pagination_computes_offset_from_page() {
        let q = params(&[("page", "2"), ("limit", "10")]);
        let t = translator().paginate(&q);
        let sql = t.to_sql();
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("OFFSET 10"));
    }

    #[test]
    fn non_numeric_page_and_limit_fall_back_to_defaults() {
        let q = params(&[("page", "abc"), ("limit", "lots")]);
        let t = translator().paginate(&q);
        let sql = t.to_sql();
        assert!(sql.contains("LIMIT 100"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn huge_page_number_degrades_to_no_skip() {
        let q = params(&[("page", &i64::MAX.to_string()), ("limit", "100")]);
        let t = translator().paginate(&q);
        let sql = t.to_sql();
        assert!(sql.contains("LIMIT 100"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn absent_page_means_no_skip() {
        let q = params(&[("limit", "25")]);
        let t = translator().paginate(&q);
        let sql = t.to_sql();
        assert!(sql.contains("LIMIT 25"));
        assert!(!sql.contains("OFFSET"));
    }

    #[test]
    fn base_constraint_survives_an_empty_filter() {
        let t = translator()
            .constrain("secret_tour", "=", json!(false))
            .filter(&params(&[]))
            .unwrap();
        assert!(t.to_sql().contains("WHERE secret_tour = $1"));
    }

    #[test]
    fn full_chain_keeps_the_fixed_step_order() {
        let q = params(&[
            ("duration[gte]", "5"),
            ("sort", "-price"),
            ("fields", "name,price,duration"),
            ("page", "3"),
            ("limit", "20"),
        ]);
        let t = translator()
            .constrain("secret_tour", "=", json!(false))
            .filter(&q)
            .unwrap()
            .sort(&q)
            .unwrap()
            .project(&q)
            .unwrap()
            .paginate(&q);
        assert_eq!(
            t.to_sql(),
            "SELECT name, price, duration FROM tours \
             WHERE secret_tour = $1 AND duration >= $2 \
             ORDER BY price DESC LIMIT 20 OFFSET 40"
        );
        assert_eq!(t.bound_params(), &[json!(false), json!(5)]);
    }
}
