//! Sneaker retrieval by row id.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::search::{row_to_sneaker, StoredSneaker, SNEAKER_COLUMNS};

pub async fn get_in_pool(pool: &SqlitePool, id: i64) -> Result<Option<StoredSneaker>> {
    let row = sqlx::query(&format!("SELECT {} FROM sneakers WHERE id = ?", SNEAKER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_sneaker))
}

/// Core get function returning structured data.
pub async fn get_sneaker(config: &Config, id: i64) -> Result<StoredSneaker> {
    let pool = db::connect(config).await?;
    let found = get_in_pool(&pool, id).await;
    pool.close().await;

    match found? {
        Some(sneaker) => Ok(sneaker),
        None => bail!("sneaker not found: {}", id),
    }
}

/// CLI entry point: prints one sneaker to stdout.
pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let sneaker = get_sneaker(config, id).await?;

    println!("--- Sneaker ---");
    println!("id:           {}", sneaker.id);
    println!("brand:        {}", sneaker.brand);
    println!("colorway:     {}", sneaker.colorway);
    println!("gender:       {}", sneaker.gender);
    match sneaker.estimated_market_value {
        Some(value) => println!("value:        {:.2}", value),
        None => println!("value:        n/a"),
    }
    if let Some(ref url) = sneaker.image_url {
        println!("image_url:    {}", url);
    }
    if let Some(ref asset) = sneaker.image_asset_id {
        println!("image_asset:  {}", asset);
    }
    if let Some(ref upstream) = sneaker.upstream_id {
        println!("upstream_id:  {}", upstream);
    }
    println!("run_id:       {}", sneaker.run_id);
    println!("ingested_at:  {}", format_ts_iso(sneaker.ingested_at));
    println!();

    println!("--- Links ---");
    match sneaker.links.as_object() {
        Some(links) if !links.is_empty() => {
            for (market, url) in links {
                println!("{:<16} {}", market, url.as_str().unwrap_or(""));
            }
        }
        _ => println!("(none)"),
    }

    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
