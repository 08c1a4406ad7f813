//! SQLite-backed [`RecordSink`] and run bookkeeping.
//!
//! One pool is opened per run and reused for every insert. Each record is a
//! single `INSERT`; a failing insert affects only that record.
//!
//! Every row is tagged with the id of the run that wrote it, and each run
//! leaves a row in `ingest_runs` with its final counters.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{NormalizedRecord, RunSummary, WriteOutcome};
use crate::traits::RecordSink;

pub struct SqliteSink {
    pool: SqlitePool,
    run_id: String,
    dedup: bool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool, dedup: bool) -> Self {
        Self {
            pool,
            run_id: Uuid::new_v4().to_string(),
            dedup,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record the start of this run.
    pub async fn begin_run(&self) -> Result<()> {
        sqlx::query("INSERT INTO ingest_runs (id, started_at, status) VALUES (?, ?, 'running')")
            .bind(&self.run_id)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store the final counters of this run.
    pub async fn finish_run(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_runs
            SET finished_at = ?, status = ?, pages = ?, written = ?, rejected = ?, failed = ?, duplicates = ?
            WHERE id = ?
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(summary.status())
        .bind(summary.pages as i64)
        .bind(summary.written as i64)
        .bind(summary.rejected as i64)
        .bind(summary.failed as i64)
        .bind(summary.duplicates as i64)
        .bind(&self.run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark this run as aborted by a fatal precondition.
    pub async fn fail_run(&self) -> Result<()> {
        sqlx::query("UPDATE ingest_runs SET finished_at = ?, status = 'failed' WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(&self.run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn write(&self, record: &NormalizedRecord) -> Result<WriteOutcome> {
        let key = if self.dedup {
            Some(natural_key(record))
        } else {
            None
        };

        let result = sqlx::query(
            r#"
            INSERT INTO sneakers (run_id, upstream_id, brand, colorway, estimated_market_value, gender, image_url, image_asset_id, links, natural_key, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&self.run_id)
        .bind(&record.upstream_id)
        .bind(&record.brand)
        .bind(&record.colorway)
        .bind(record.estimated_market_value)
        .bind(record.gender.as_str())
        .bind(&record.image_url)
        .bind(&record.image_asset_id)
        .bind(&record.links)
        .bind(&key)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(WriteOutcome::Duplicate)
        } else {
            Ok(WriteOutcome::Inserted)
        }
    }
}

/// Hex SHA-256 over brand, colorway and links.
pub fn natural_key(record: &NormalizedRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.brand.as_bytes());
    hasher.update([0u8]);
    hasher.update(record.colorway.as_bytes());
    hasher.update([0u8]);
    hasher.update(record.links.as_bytes());
    format!("{:x}", hasher.finalize())
}
