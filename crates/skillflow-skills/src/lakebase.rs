//! `lakebase_query` skills: stay listings, reviews and destinations from a
//! Lakebase (PostgreSQL) database.
//!
//! Configuration read from the manifest:
//!
//! - `config.endpoint` - connection URL (default `${LAKEBASE_DATABASE_URL}`);
//!   when unset, the standard `PG*` environment variables are used if
//!   `PGHOST` is present
//! - `config.timeout_seconds` - connection acquire timeout (default 30)
//! - `config.extra.query_type` - `search_listings` (default), `get_listing`,
//!   `get_reviews` or `get_destinations`
//! - `config.extra.schema` - schema holding `listings` and `reviews` (default `public`)
//!
//! Listings are returned as stay items:
//! `{id, name, location, pricePerNight, rating, highlights, source, reviewCount}`.

use crate::env::{is_set, non_empty_var, resolve_env_var};
use crate::error::SkillError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use skillflow_flow::{Capability, CapabilityError};
use skillflow_protocol::models::{SkillManifest, ValueMap};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

/// Default connection URL
pub const DEFAULT_DATABASE_URL: &str = "${LAKEBASE_DATABASE_URL}";
/// Default schema holding the tables
pub const DEFAULT_SCHEMA: &str = "public";

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_GUESTS: i64 = 2;
const DEFAULT_LIMIT: i64 = 10;
const MAX_CONNECTIONS: u32 = 4;

const SEARCH_LISTINGS_SQL: &str = r#"
SELECT to_jsonb(l) AS row FROM (
    SELECT id, title, city, state, price_per_night, rating, bedrooms,
           max_guests, property_type, review_count
    FROM {schema}.listings
    WHERE ($1 = '' OR city ILIKE '%' || $1 || '%' OR state ILIKE '%' || $1 || '%')
      AND max_guests >= $2
      AND ($3::float8 IS NULL OR price_per_night <= $3)
    ORDER BY rating DESC NULLS LAST
    LIMIT $4
) l
"#;

const GET_LISTING_SQL: &str = r#"
SELECT to_jsonb(l) AS row FROM {schema}.listings l WHERE l.id::text = $1
"#;

const GET_REVIEWS_SQL: &str = r#"
SELECT to_jsonb(r) AS row FROM {schema}.reviews r WHERE r.listing_id::text = $1 LIMIT $2
"#;

const GET_DESTINATIONS_SQL: &str = r#"
SELECT to_jsonb(d) AS row FROM (
    SELECT city, state, COUNT(*) AS listing_count,
           ROUND(AVG(price_per_night)::numeric, 2) AS avg_price
    FROM {schema}.listings
    GROUP BY city, state
    ORDER BY listing_count DESC
    LIMIT $1
) d
"#;

/// Queries a `lakebase_query` skill can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Listings filtered by location, guests and price
    SearchListings,
    /// One listing by id
    GetListing,
    /// Reviews of one listing
    GetReviews,
    /// Cities ranked by listing count
    GetDestinations,
}

impl QueryType {
    /// Parse a query type as written in a manifest
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "search_listings" => Some(QueryType::SearchListings),
            "get_listing" => Some(QueryType::GetListing),
            "get_reviews" => Some(QueryType::GetReviews),
            "get_destinations" => Some(QueryType::GetDestinations),
            _ => None,
        }
    }
}

/// Factory for `lakebase_query` skills
pub fn factory(manifest: &SkillManifest) -> Result<Box<dyn Capability>, CapabilityError> {
    Ok(Box::new(LakebaseQueryCapability::from_manifest(manifest)?))
}

/// Capability reading stay data from Lakebase
#[derive(Debug)]
pub struct LakebaseQueryCapability {
    query_name: String,
    query_type: Option<QueryType>,
    schema: String,
    database_url: String,
    timeout: Duration,
    pool: OnceCell<PgPool>,
}

impl LakebaseQueryCapability {
    /// Build the capability from a manifest.
    ///
    /// The schema name is validated here; the database is only contacted on
    /// the first real query.
    pub fn from_manifest(manifest: &SkillManifest) -> Result<Self, SkillError> {
        let config = &manifest.config;
        let extra_str = |key: &str| config.extra.get(key).and_then(Value::as_str);

        let query_name = extra_str("query_type").unwrap_or("search_listings").to_string();
        let schema = extra_str("schema").unwrap_or(DEFAULT_SCHEMA).to_string();
        if !Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?.is_match(&schema) {
            return Err(SkillError::invalid_input(
                "config.extra.schema",
                format!("'{}' is not a plain identifier", schema),
            ));
        }

        Ok(Self {
            query_type: QueryType::parse(&query_name),
            query_name,
            schema,
            database_url: resolve_env_var(config.endpoint.as_deref().unwrap_or(DEFAULT_DATABASE_URL)),
            timeout: Duration::from_secs(config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
            pool: OnceCell::new(),
        })
    }

    fn connect_options(&self) -> Result<PgConnectOptions, SkillError> {
        if is_set(&self.database_url) {
            return Ok(self.database_url.parse::<PgConnectOptions>()?);
        }
        if non_empty_var("PGHOST").is_some() {
            return Ok(PgConnectOptions::new());
        }
        Err(SkillError::NotConfigured(
            "Lakebase database (config.endpoint or PGHOST)".to_string(),
        ))
    }

    async fn pool(&self) -> Result<&PgPool, SkillError> {
        self.pool
            .get_or_try_init(|| async {
                let options = self.connect_options()?;
                info!("Opening Lakebase pool");
                Ok::<_, SkillError>(
                    PgPoolOptions::new()
                        .max_connections(MAX_CONNECTIONS)
                        .acquire_timeout(self.timeout)
                        .connect_lazy_with(options),
                )
            })
            .await
    }

    fn sql(&self, template: &str) -> String {
        template.replace("{schema}", &self.schema)
    }

    #[instrument(skip(self, inputs))]
    async fn search_listings(&self, inputs: &ValueMap) -> Result<ValueMap, SkillError> {
        let location = inputs.get("location").and_then(Value::as_str).unwrap_or_default();
        let guests = inputs.get("guests").and_then(Value::as_i64).unwrap_or(DEFAULT_GUESTS);
        let price_max = inputs.get("price_max").and_then(Value::as_f64);
        let limit = inputs.get("limit").and_then(Value::as_i64).unwrap_or(DEFAULT_LIMIT);

        let sql = self.sql(SEARCH_LISTINGS_SQL);
        let rows = sqlx::query(&sql)
            .bind(location)
            .bind(guests)
            .bind(price_max)
            .bind(limit)
            .fetch_all(self.pool().await?)
            .await?;

        let items: Vec<Value> = json_rows(&rows)?.iter().map(listing_item).collect();
        let items = filter_by_rating(items, inputs.get("rating_min").and_then(Value::as_f64));
        info!("Found {} listings", items.len());
        Ok(counted("items", items))
    }

    async fn get_listing(&self, inputs: &ValueMap) -> Result<ValueMap, SkillError> {
        let listing_id = listing_id(inputs);
        let sql = self.sql(GET_LISTING_SQL);
        let row = sqlx::query(&sql)
            .bind(listing_id)
            .fetch_optional(self.pool().await?)
            .await?;

        let listing = match row {
            Some(row) => Some(row.try_get::<Value, _>("row")?),
            None => None,
        };
        let mut output = ValueMap::new();
        output.insert("found".to_string(), json!(listing.is_some()));
        output.insert("listing".to_string(), listing.unwrap_or(Value::Null));
        Ok(output)
    }

    async fn get_reviews(&self, inputs: &ValueMap) -> Result<ValueMap, SkillError> {
        let limit = inputs.get("limit").and_then(Value::as_i64).unwrap_or(DEFAULT_LIMIT);
        let sql = self.sql(GET_REVIEWS_SQL);
        let rows = sqlx::query(&sql)
            .bind(listing_id(inputs))
            .bind(limit)
            .fetch_all(self.pool().await?)
            .await?;
        Ok(counted("reviews", json_rows(&rows)?))
    }

    async fn get_destinations(&self, inputs: &ValueMap) -> Result<ValueMap, SkillError> {
        let limit = inputs.get("limit").and_then(Value::as_i64).unwrap_or(DEFAULT_LIMIT);
        let sql = self.sql(GET_DESTINATIONS_SQL);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(self.pool().await?)
            .await?;
        Ok(counted("destinations", json_rows(&rows)?))
    }
}

#[async_trait]
impl Capability for LakebaseQueryCapability {
    async fn execute(&self, inputs: &ValueMap) -> Result<ValueMap, CapabilityError> {
        let Some(query_type) = self.query_type else {
            warn!("Unknown Lakebase query_type: {}", self.query_name);
            return Ok(counted("items", Vec::new()));
        };

        let output = match query_type {
            QueryType::SearchListings => self.search_listings(inputs).await,
            QueryType::GetListing => self.get_listing(inputs).await,
            QueryType::GetReviews => self.get_reviews(inputs).await,
            QueryType::GetDestinations => self.get_destinations(inputs).await,
        };
        Ok(output?)
    }

    async fn mock_execute(
        &self,
        _manifest: &SkillManifest,
        inputs: &ValueMap,
    ) -> Result<ValueMap, CapabilityError> {
        let location = inputs
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or("Miami");
        Ok(mock_output(location))
    }
}

fn json_rows(rows: &[PgRow]) -> Result<Vec<Value>, sqlx::Error> {
    rows.iter().map(|row| row.try_get::<Value, _>("row")).collect()
}

/// Listing ids are accepted with or without the `stay_` prefix
fn listing_id(inputs: &ValueMap) -> String {
    let id = match inputs.get("listing_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    id.strip_prefix("stay_").map(str::to_string).unwrap_or(id)
}

fn counted(key: &str, rows: Vec<Value>) -> ValueMap {
    let mut output = ValueMap::new();
    output.insert("total_count".to_string(), json!(rows.len()));
    output.insert(key.to_string(), Value::Array(rows));
    output
}

fn listing_item(row: &Value) -> Value {
    let field = |key: &str| row.get(key).filter(|v| !v.is_null());
    let text = |key: &str, default: &str| {
        field(key)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| default.to_string())
    };
    let number = |key: &str| {
        field(key)
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0.0)
    };

    json!({
        "id": format!("stay_{}", text("id", "")),
        "name": text("title", ""),
        "location": format!("{}, {}", text("city", ""), text("state", "")),
        "pricePerNight": number("price_per_night"),
        "rating": number("rating"),
        "highlights": [
            format!("{} bedrooms", text("bedrooms", "1")),
            format!("Up to {} guests", text("max_guests", "2")),
            capitalize(&text("property_type", "property")),
        ],
        "source": "lakehouse",
        "reviewCount": field("review_count").cloned().unwrap_or(json!(0)),
    })
}

fn filter_by_rating(items: Vec<Value>, rating_min: Option<f64>) -> Vec<Value> {
    match rating_min {
        Some(min) if min > 0.0 => items
            .into_iter()
            .filter(|item| item.get("rating").and_then(Value::as_f64).unwrap_or(0.0) >= min)
            .collect(),
        _ => items,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn mock_output(location: &str) -> ValueMap {
    let items = vec![
        json!({
            "id": "stay_1",
            "name": format!("Beautiful Home in {}", location),
            "location": format!("{}, FL", location),
            "pricePerNight": 189.0,
            "rating": 4.7,
            "highlights": ["3 bedrooms", "Up to 6 guests", "House"],
            "source": "lakehouse",
            "reviewCount": 23
        }),
        json!({
            "id": "stay_2",
            "name": format!("Cozy Apartment in {}", location),
            "location": format!("{}, FL", location),
            "pricePerNight": 129.0,
            "rating": 4.5,
            "highlights": ["1 bedroom", "Up to 3 guests", "Apartment"],
            "source": "lakehouse",
            "reviewCount": 15
        }),
    ];
    counted("items", items)
}
