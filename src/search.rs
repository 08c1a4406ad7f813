//! Keyword search and paged listing over stored sneakers.
//!
//! Search splits the query on whitespace; every keyword must appear
//! (substring, case-insensitive for ASCII) in at least one of `brand`,
//! `colorway` or `gender`. Listing pages through all rows in insertion order.

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::Config;
use crate::db;

pub const DEFAULT_SEARCH_LIMIT: i64 = 25;
pub const LIST_PAGE_SIZE: i64 = 25;

/// A row of the `sneakers` table as shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSneaker {
    pub id: i64,
    pub upstream_id: Option<String>,
    pub brand: String,
    pub colorway: String,
    pub estimated_market_value: Option<f64>,
    pub gender: String,
    pub image_url: Option<String>,
    pub image_asset_id: Option<String>,
    pub links: serde_json::Value,
    pub run_id: String,
    pub ingested_at: i64,
}

pub(crate) const SNEAKER_COLUMNS: &str = "id, upstream_id, brand, colorway, estimated_market_value, gender, image_url, image_asset_id, links, run_id, ingested_at";

pub(crate) fn row_to_sneaker(row: &SqliteRow) -> StoredSneaker {
    let links_json: String = row.get("links");
    StoredSneaker {
        id: row.get("id"),
        upstream_id: row.get("upstream_id"),
        brand: row.get("brand"),
        colorway: row.get("colorway"),
        estimated_market_value: row.get("estimated_market_value"),
        gender: row.get("gender"),
        image_url: row.get("image_url"),
        image_asset_id: row.get("image_asset_id"),
        links: serde_json::from_str(&links_json).unwrap_or(serde_json::json!({})),
        run_id: row.get("run_id"),
        ingested_at: row.get("ingested_at"),
    }
}

/// One page of [`list_sneakers`].
#[derive(Debug, Clone, Serialize)]
pub struct SneakerPage {
    pub sneakers: Vec<StoredSneaker>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total_sneakers: i64,
}

/// Escape LIKE wildcards so keywords match literally.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub async fn search_in_pool(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<StoredSneaker>> {
    let keywords: Vec<&str> = query.split_whitespace().collect();
    if keywords.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM sneakers WHERE 1 = 1", SNEAKER_COLUMNS));
    for keyword in &keywords {
        let pattern = like_pattern(keyword);
        builder.push(" AND (brand LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR colorway LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR gender LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
    builder.push(" ORDER BY id ASC LIMIT ");
    builder.push_bind(limit.max(1));

    let rows = builder.build().fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_sneaker).collect())
}

/// Core search function returning structured data.
pub async fn search_sneakers(config: &Config, query: &str, limit: Option<i64>) -> Result<Vec<StoredSneaker>> {
    let pool = db::connect(config).await?;
    let results = search_in_pool(&pool, query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT)).await;
    pool.close().await;
    results
}

pub async fn list_in_pool(pool: &SqlitePool, page: i64) -> Result<SneakerPage> {
    let page = page.clamp(1, i64::MAX / LIST_PAGE_SIZE);
    let offset = (page - 1) * LIST_PAGE_SIZE;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM sneakers ORDER BY id ASC LIMIT ? OFFSET ?",
        SNEAKER_COLUMNS
    ))
    .bind(LIST_PAGE_SIZE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sneakers")
        .fetch_one(pool)
        .await?;

    Ok(SneakerPage {
        sneakers: rows.iter().map(row_to_sneaker).collect(),
        current_page: page,
        total_pages: (total + LIST_PAGE_SIZE - 1) / LIST_PAGE_SIZE,
        total_sneakers: total,
    })
}

pub async fn list_sneakers(config: &Config, page: i64) -> Result<SneakerPage> {
    let pool = db::connect(config).await?;
    let listing = list_in_pool(&pool, page).await;
    pool.close().await;
    listing
}

fn print_sneaker(position: usize, sneaker: &StoredSneaker) {
    let value = sneaker
        .estimated_market_value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "{}. [#{}] {} / {} ({})",
        position, sneaker.id, sneaker.brand, sneaker.colorway, sneaker.gender
    );
    println!("    value: {}", value);
    if let Some(ref url) = sneaker.image_url {
        println!("    image: {}", url);
    }
    println!();
}

/// CLI entry point for `sneakr search`.
pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let results = search_sneakers(config, query, limit).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, sneaker) in results.iter().enumerate() {
        print_sneaker(i + 1, sneaker);
    }
    Ok(())
}

/// CLI entry point for `sneakr list`.
pub async fn run_list(config: &Config, page: i64) -> Result<()> {
    let listing = list_sneakers(config, page).await?;
    let offset = ((listing.current_page - 1) * LIST_PAGE_SIZE) as usize;

    for (i, sneaker) in listing.sneakers.iter().enumerate() {
        print_sneaker(offset + i + 1, sneaker);
    }
    println!(
        "page {} of {} ({} sneakers)",
        listing.current_page, listing.total_pages, listing.total_sneakers
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();

        let rows = [
            ("Nike", "White/Black", "men"),
            ("Nike", "University Red", "women"),
            ("Adidas", "Core Black 100%", "unisex"),
        ];
        for (brand, colorway, gender) in rows {
            sqlx::query(
                "INSERT INTO sneakers (run_id, brand, colorway, gender, links, ingested_at) VALUES ('r', ?, ?, ?, '{}', 0)",
            )
            .bind(brand)
            .bind(colorway)
            .bind(gender)
            .execute(&pool)
            .await
            .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn every_keyword_must_match() {
        let pool = seeded_pool().await;

        let hits = search_in_pool(&pool, "nike", 25).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = search_in_pool(&pool, "nike women", 25).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].colorway, "University Red");

        assert!(search_in_pool(&pool, "   ", 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wildcards_match_literally() {
        let pool = seeded_pool().await;
        let hits = search_in_pool(&pool, "100%", 25).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(search_in_pool(&pool, "%", 25).await.unwrap().len() == 1);
        assert!(search_in_pool(&pool, "_", 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_reports_totals() {
        let pool = seeded_pool().await;
        let listing = list_in_pool(&pool, 1).await.unwrap();
        assert_eq!(listing.total_sneakers, 3);
        assert_eq!(listing.total_pages, 1);
        assert_eq!(listing.sneakers.len(), 3);

        let listing = list_in_pool(&pool, 2).await.unwrap();
        assert!(listing.sneakers.is_empty());
    }

    #[tokio::test]
    async fn huge_page_number_is_clamped() {
        let pool = seeded_pool().await;
        let listing = list_in_pool(&pool, i64::MAX).await.unwrap();
        assert!(listing.sneakers.is_empty());
        assert_eq!(listing.current_page, i64::MAX / LIST_PAGE_SIZE);
        assert_eq!(listing.total_sneakers, 3);

        let listing = list_in_pool(&pool, -4).await.unwrap();
        assert_eq!(listing.current_page, 1);
        assert_eq!(listing.sneakers.len(), 3);
    }
}
