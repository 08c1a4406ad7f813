//! Database statistics and run history.
//!
//! Gives a quick picture of what is stored: row counts, gender and brand
//! breakdowns, and the most recent ingestion runs with their counters.
//! Used by `sneakr stats` to check that syncs are doing what they should.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::get::format_ts_iso;

const TOP_BRANDS: i64 = 10;
const RECENT_RUNS: i64 = 5;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sneakers")
        .fetch_one(&pool)
        .await?;
    let with_value: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sneakers WHERE estimated_market_value IS NOT NULL")
            .fetch_one(&pool)
            .await?;
    let with_image: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sneakers WHERE image_url IS NOT NULL")
            .fetch_one(&pool)
            .await?;

    println!("sneakr: database stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!();
    println!("  Sneakers:    {}", total);
    println!("  With value:  {}", with_value);
    println!("  With image:  {}", with_image);

    let gender_rows =
        sqlx::query("SELECT gender, COUNT(*) AS n FROM sneakers GROUP BY gender ORDER BY n DESC")
            .fetch_all(&pool)
            .await?;
    if !gender_rows.is_empty() {
        println!();
        println!("  By gender:");
        for row in &gender_rows {
            let gender: String = row.get("gender");
            let n: i64 = row.get("n");
            println!("    {:<10} {:>8}", gender, n);
        }
    }

    let brand_rows = sqlx::query(
        "SELECT brand, COUNT(*) AS n FROM sneakers GROUP BY brand ORDER BY n DESC, brand ASC LIMIT ?",
    )
    .bind(TOP_BRANDS)
    .fetch_all(&pool)
    .await?;
    if !brand_rows.is_empty() {
        println!();
        println!("  Top brands:");
        for row in &brand_rows {
            let brand: String = row.get("brand");
            let n: i64 = row.get("n");
            println!("    {:<24} {:>8}", brand, n);
        }
    }

    let run_rows = sqlx::query(
        r#"
        SELECT id, started_at, finished_at, status, pages, written, rejected, failed, duplicates
        FROM ingest_runs
        ORDER BY started_at DESC
        LIMIT ?
        "#,
    )
    .bind(RECENT_RUNS)
    .fetch_all(&pool)
    .await?;

    if !run_rows.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "  {:<10} {:<10} {:>6} {:>8} {:>8} {:>6} {:>6} {:>8}   {}",
            "RUN", "STATUS", "PAGES", "WRITTEN", "REJECTED", "FAILED", "DUPES", "TOOK", "STARTED"
        );
        println!("  {}", "-".repeat(96));
        for row in &run_rows {
            let id: String = row.get("id");
            let short_id: String = id.chars().take(8).collect();
            let status: String = row.get("status");
            let started_at: i64 = row.get("started_at");
            let finished_at: Option<i64> = row.get("finished_at");
            println!(
                "  {:<10} {:<10} {:>6} {:>8} {:>8} {:>6} {:>6} {:>8}   {}",
                short_id,
                status,
                row.get::<i64, _>("pages"),
                row.get::<i64, _>("written"),
                row.get::<i64, _>("rejected"),
                row.get::<i64, _>("failed"),
                row.get::<i64, _>("duplicates"),
                format_duration(started_at, finished_at),
                format_ts_iso(started_at)
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Wall time of a run, `-` while it is still running.
fn format_duration(started_at: i64, finished_at: Option<i64>) -> String {
    match finished_at {
        Some(end) if end >= started_at => {
            let secs = end - started_at;
            if secs < 60 {
                format!("{}s", secs)
            } else {
                format!("{}m{:02}s", secs / 60, secs % 60)
            }
        }
        _ => "-".to_string(),
    }
}
