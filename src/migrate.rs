//! Database schema migrations (idempotent).
//!
//! `sneakr init` runs these explicitly; `sneakr sync` applies them too before
//! the first page so a fresh database never fails mid-run.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // No uniqueness on upstream_id: re-ingesting the same page adds rows
    // unless natural_key is populated (dedup mode).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sneakers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            upstream_id TEXT,
            brand TEXT NOT NULL,
            colorway TEXT NOT NULL,
            estimated_market_value REAL,
            gender TEXT NOT NULL CHECK (gender IN ('men', 'women', 'unisex')),
            image_url TEXT,
            image_asset_id TEXT,
            links TEXT NOT NULL DEFAULT '{}',
            natural_key TEXT,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            status TEXT NOT NULL,
            pages INTEGER NOT NULL DEFAULT 0,
            written INTEGER NOT NULL DEFAULT 0,
            rejected INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            duplicates INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sneakers_natural_key ON sneakers(natural_key) WHERE natural_key IS NOT NULL",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sneakers_brand ON sneakers(brand)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sneakers_run_id ON sneakers(run_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingest_runs_started_at ON ingest_runs(started_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
