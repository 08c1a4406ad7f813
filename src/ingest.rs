//! Ingestion pipeline orchestration.
//!
//! Walks the upstream catalog page by page, normalizes every record, and
//! writes the survivors to the store:
//!
//! ```text
//! Idle ─▶ FetchingPage(1) ─▶ NormalizingPage(p) ─▶ WritingPage(p) ─▶ FetchingPage(p+1)
//!              │                                                          │
//!              └──────────── empty page / past ceiling / cancelled ──────▶ Done
//! ```
//!
//! # Failure handling
//!
//! | Failure | Scope | Effect |
//! |---------|-------|--------|
//! | fetch error, timeout, non-2xx | page | counted in `failed`; `Done` under `stop`, next page under `continue` |
//! | missing brand/colorway, unreadable record, image upload | record | counted in `rejected`, siblings unaffected |
//! | insert rejected by the store | record | counted in `failed`, page continues |
//! | store unavailable, upstream unreachable before any page, no re-host token | run | [`IngestError::FatalPrecondition`] |
//!
//! There is no retry: a failed unit is skipped and counted.
//!
//! Processing is strictly sequential. Pages are handled in increasing order
//! from 1 and records in the order upstream returned them.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, PageErrorPolicy};
use crate::connector_catalog::CatalogSource;
use crate::db;
use crate::error::IngestError;
use crate::migrate;
use crate::models::{NormalizedRecord, PageReport, RunSummary, WriteOutcome};
use crate::normalize::Normalizer;
use crate::rehost::StrapiAssetHost;
use crate::sqlite_store::SqliteSink;
use crate::traits::{PageSource, RecordSink};

/// Driver knobs, resolved from [`Config`] plus command-line flags.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub page_size: u32,
    pub page_ceiling: Option<u32>,
    pub on_page_error: PageErrorPolicy,
    /// Fetch and normalize, but never call the sink or upload images.
    pub dry_run: bool,
}

impl IngestOptions {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            page_size: config.upstream.page_size,
            page_ceiling: config.upstream.page_ceiling,
            on_page_error: config.ingest.on_page_error,
            dry_run,
        }
    }
}

/// States of the ingestion driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    FetchingPage(u32),
    NormalizingPage(u32),
    WritingPage(u32),
    Done,
}

/// Run the `sync` command: open the store, build the collaborators from
/// config, ingest until exhaustion, print the summary.
pub async fn run_sync(
    config: &Config,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let pool = db::connect(config).await.map_err(|e| {
        IngestError::FatalPrecondition(format!(
            "cannot open store at {}: {:#}",
            config.db.path.display(),
            e
        ))
    })?;
    migrate::apply_schema(&pool).await.map_err(|e| {
        IngestError::FatalPrecondition(format!("cannot prepare store schema: {:#}", e))
    })?;

    let source = CatalogSource::new(&config.upstream)?;

    let normalizer = match &config.rehost {
        Some(rehost) => {
            let host = StrapiAssetHost::connect(rehost).await?;
            tracing::info!(upload_url = %rehost.upload_url, "image re-hosting enabled");
            Normalizer::with_asset_host(Arc::new(host))
        }
        None => Normalizer::new(),
    };

    let sink = SqliteSink::new(pool.clone(), config.ingest.dedup);
    if !dry_run {
        sink.begin_run().await.map_err(|e| {
            IngestError::FatalPrecondition(format!("cannot write to store: {:#}", e))
        })?;
    }

    let options = IngestOptions::from_config(config, dry_run);
    tracing::info!(
        run_id = sink.run_id(),
        base_url = %config.upstream.base_url,
        page_size = options.page_size,
        page_ceiling = ?options.page_ceiling,
        on_page_error = options.on_page_error.as_str(),
        dedup = config.ingest.dedup,
        rehost = normalizer.rehosting(),
        dry_run,
        "starting ingestion"
    );

    let outcome = ingest(&source, &normalizer, &sink, &options, &cancel).await;

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            if !dry_run {
                if let Err(mark_err) = sink.fail_run().await {
                    tracing::warn!(error = %mark_err, "could not mark run as failed");
                }
            }
            pool.close().await;
            return Err(e.into());
        }
    };

    if !dry_run {
        record_finish(&sink, &summary).await;
    }
    print_summary(&summary, config.ingest.dedup, dry_run);

    pool.close().await;
    Ok(summary)
}

/// Drive one ingestion run to `Done`.
///
/// Only fatal preconditions return `Err`; every other failure is counted in
/// the returned [`RunSummary`].
pub async fn ingest(
    source: &dyn PageSource,
    normalizer: &Normalizer,
    sink: &dyn RecordSink,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<RunSummary, IngestError> {
    let preview;
    let normalizer = if options.dry_run && normalizer.rehosting() {
        preview = normalizer.preview();
        &preview
    } else {
        normalizer
    };

    let mut summary = RunSummary::default();
    let mut state = DriverState::Idle;

    let mut page_hint: Option<u32> = None;
    let mut any_page_fetched = false;
    let mut report = PageReport::default();
    let mut raw_records: Vec<Value> = Vec::new();
    let mut normalized: Vec<NormalizedRecord> = Vec::new();

    loop {
        state = match state {
            DriverState::Idle => DriverState::FetchingPage(1),

            DriverState::FetchingPage(page) => {
                if cancel.is_cancelled() {
                    tracing::warn!(page, "cancellation requested; stopping before page");
                    summary.cancelled = true;
                    DriverState::Done
                } else if past_ceiling(page, options.page_ceiling, page_hint) {
                    tracing::info!(page, "page ceiling reached");
                    DriverState::Done
                } else {
                    summary.pages += 1;
                    report = PageReport {
                        page,
                        ..Default::default()
                    };

                    match source.fetch_page(page, options.page_size).await {
                        Ok(fetched) => {
                            any_page_fetched = true;
                            if fetched.page_count.is_some() {
                                page_hint = fetched.page_count;
                            }
                            if fetched.records.is_empty() {
                                log_page(&report);
                                tracing::debug!(page, "upstream exhausted");
                                DriverState::Done
                            } else {
                                report.fetched = fetched.records.len() as u64;
                                raw_records = fetched.records;
                                DriverState::NormalizingPage(page)
                            }
                        }
                        Err(e) if !any_page_fetched && e.is_connect() => {
                            return Err(IngestError::FatalPrecondition(format!(
                                "upstream unreachable: {}",
                                e
                            )));
                        }
                        Err(e) => {
                            report.failed = 1;
                            log_page(&report);
                            summary.absorb(&report);
                            match options.on_page_error {
                                PageErrorPolicy::Stop => {
                                    tracing::error!(page, error = %e, "page fetch failed; stopping");
                                    DriverState::Done
                                }
                                PageErrorPolicy::Continue => {
                                    tracing::error!(page, error = %e, "page fetch failed; skipping page");
                                    DriverState::FetchingPage(page + 1)
                                }
                            }
                        }
                    }
                }
            }

            DriverState::NormalizingPage(page) => {
                for raw in raw_records.drain(..) {
                    match normalizer.normalize(&raw).await {
                        Ok(record) => normalized.push(record),
                        Err(rejection) => {
                            report.rejected += 1;
                            tracing::warn!(
                                page,
                                upstream_id = %raw_id(&raw),
                                reason = rejection.code(),
                                "record skipped: {}",
                                rejection
                            );
                        }
                    }
                }
                DriverState::WritingPage(page)
            }

            DriverState::WritingPage(page) => {
                if options.dry_run {
                    report.written = normalized.len() as u64;
                    normalized.clear();
                } else {
                    for record in normalized.drain(..) {
                        match sink.write(&record).await {
                            Ok(WriteOutcome::Inserted) => report.written += 1,
                            Ok(WriteOutcome::Duplicate) => {
                                report.duplicates += 1;
                                tracing::debug!(
                                    page,
                                    brand = %record.brand,
                                    colorway = %record.colorway,
                                    "duplicate natural key; not inserted"
                                );
                            }
                            Err(e) => {
                                report.failed += 1;
                                tracing::error!(
                                    page,
                                    upstream_id = record.upstream_id.as_deref().unwrap_or("-"),
                                    reason = "write_failed",
                                    error = %e,
                                    "record write failed"
                                );
                            }
                        }
                    }
                }

                log_page(&report);
                summary.absorb(&report);
                DriverState::FetchingPage(page + 1)
            }

            DriverState::Done => break,
        };
    }

    tracing::info!(
        pages = summary.pages,
        written = summary.written,
        rejected = summary.rejected,
        failed = summary.failed,
        duplicates = summary.duplicates,
        status = summary.status(),
        "ingestion finished"
    );

    Ok(summary)
}

/// Store the final counters of a completed run. The run already reached
/// `Done`, so a failure here is logged and does not change the exit status.
async fn record_finish(sink: &SqliteSink, summary: &RunSummary) -> bool {
    match sink.finish_run(summary).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(run_id = sink.run_id(), error = %e, "could not record run summary");
            false
        }
    }
}

/// A page is past the ceiling when it exceeds the configured ceiling or the
/// upstream's own page count, whichever is smaller.
fn past_ceiling(page: u32, ceiling: Option<u32>, hint: Option<u32>) -> bool {
    let limit = match (ceiling, hint) {
        (Some(c), Some(h)) => Some(c.min(h)),
        (c, h) => c.or(h),
    };
    limit.is_some_and(|limit| page > limit)
}

fn raw_id(raw: &Value) -> String {
    match raw.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "-".to_string(),
    }
}

fn log_page(report: &PageReport) {
    if report.failed > 0 {
        tracing::info!(
            "page {}: fetched {}, wrote {}, rejected {}, failed {}",
            report.page,
            report.fetched,
            report.written,
            report.rejected,
            report.failed
        );
    } else {
        tracing::info!(
            "page {}: fetched {}, wrote {}, rejected {}",
            report.page,
            report.fetched,
            report.written,
            report.rejected
        );
    }
}

fn print_summary(summary: &RunSummary, dedup: bool, dry_run: bool) {
    if dry_run {
        println!("sync catalog (dry-run)");
    } else {
        println!("sync catalog");
    }
    println!("  pages: {}", summary.pages);
    println!("  written: {}", summary.written);
    println!("  rejected: {}", summary.rejected);
    println!("  failed: {}", summary.failed);
    if dedup {
        println!("  duplicates: {}", summary.duplicates);
    }
    if summary.cancelled {
        println!("  status: cancelled");
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssetUploadError, FetchError};
    use crate::traits::{AssetHost, HostedAsset, Page};
    use sqlx::sqlite::SqlitePoolOptions;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    enum Scripted {
        Records(Vec<Value>),
        /// Records plus the upstream's total page count.
        Hinted(Vec<Value>, u32),
        Fail(FetchError),
    }

    /// Plays back one scripted response per fetch; empty page once exhausted.
    struct ScriptedSource {
        pages: Mutex<VecDeque<Scripted>>,
        calls: AtomicU32,
        requested: Mutex<Vec<u32>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Scripted>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                calls: AtomicU32::new(0),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, page: u32, _page_size: u32) -> Result<Page, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(page);
            match self.pages.lock().unwrap().pop_front() {
                Some(Scripted::Records(records)) => Ok(Page {
                    records,
                    page_count: None,
                }),
                Some(Scripted::Hinted(records, page_count)) => Ok(Page {
                    records,
                    page_count: Some(page_count),
                }),
                Some(Scripted::Fail(e)) => Err(e),
                None => Ok(Page::default()),
            }
        }
    }

    /// Collects writes; fails every write whose brand is listed in `fail_brands`.
    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<NormalizedRecord>>,
        fail_brands: Vec<&'static str>,
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn write(&self, record: &NormalizedRecord) -> Result<WriteOutcome> {
            if self.fail_brands.contains(&record.brand.as_str()) {
                anyhow::bail!("constraint violation");
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(WriteOutcome::Inserted)
        }
    }

    fn sneaker(brand: &str, colorway: &str) -> Value {
        json!({ "id": format!("{}-{}", brand, colorway), "attributes": { "brand": brand, "colorway": colorway } })
    }

    fn options() -> IngestOptions {
        IngestOptions {
            page_size: 2,
            page_ceiling: None,
            on_page_error: PageErrorPolicy::Stop,
            dry_run: false,
        }
    }

    async fn run(source: &ScriptedSource, sink: &MemorySink, opts: &IngestOptions) -> RunSummary {
        ingest(source, &Normalizer::new(), sink, opts, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stops_after_first_empty_page() {
        let source = ScriptedSource::new(vec![
            Scripted::Records(vec![sneaker("Nike", "a")]),
            Scripted::Records(vec![sneaker("Nike", "b")]),
            Scripted::Records(vec![sneaker("Nike", "c")]),
        ]);
        let sink = MemorySink::default();
        let summary = run(&source, &sink, &options()).await;

        assert_eq!(source.calls(), 4);
        assert_eq!(summary.pages, 4);
        assert_eq!(summary.written, 3);
        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn two_pages_with_one_missing_brand() {
        let source = ScriptedSource::new(vec![
            Scripted::Records(vec![
                sneaker("Nike", "Panda"),
                json!({ "id": "x", "attributes": { "colorway": "Bred" } }),
            ]),
            Scripted::Records(vec![sneaker("Adidas", "Zebra"), sneaker("Asics", "Cream")]),
        ]);
        let sink = MemorySink::default();
        let summary = run(&source, &sink, &options()).await;

        assert_eq!(source.calls(), 3);
        assert_eq!(
            summary,
            RunSummary {
                pages: 3,
                written: 3,
                rejected: 1,
                failed: 0,
                duplicates: 0,
                cancelled: false,
            }
        );

        let brands: Vec<String> = sink.rows.lock().unwrap().iter().map(|r| r.brand.clone()).collect();
        assert_eq!(brands, vec!["Nike", "Adidas", "Asics"]);
    }

    #[tokio::test]
    async fn http_500_on_first_page_stops_run() {
        let source = ScriptedSource::new(vec![
            Scripted::Fail(FetchError::Status(500)),
            Scripted::Records(vec![sneaker("Nike", "never")]),
        ]);
        let sink = MemorySink::default();
        let summary = run(&source, &sink, &options()).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.written, 0);
        assert_eq!(summary.rejected, 0);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn continue_policy_skips_failed_page() {
        let source = ScriptedSource::new(vec![
            Scripted::Records(vec![sneaker("Nike", "a")]),
            Scripted::Fail(FetchError::Timeout(30)),
            Scripted::Records(vec![sneaker("Nike", "c")]),
        ]);
        let sink = MemorySink::default();
        let opts = IngestOptions {
            on_page_error: PageErrorPolicy::Continue,
            page_ceiling: Some(10),
            ..options()
        };
        let summary = run(&source, &sink, &opts).await;

        assert_eq!(summary.pages, 4);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn write_failure_does_not_leak_into_next_page() {
        let source = ScriptedSource::new(vec![
            Scripted::Records(vec![sneaker("Broken", "a"), sneaker("Nike", "b")]),
            Scripted::Records(vec![sneaker("Nike", "c"), sneaker("Puma", "d")]),
        ]);
        let sink = MemorySink {
            fail_brands: vec!["Broken"],
            ..Default::default()
        };
        let summary = run(&source, &sink, &options()).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.written, 3);
        assert_eq!(summary.pages, 3);
        let colorways: Vec<String> = sink.rows.lock().unwrap().iter().map(|r| r.colorway.clone()).collect();
        assert_eq!(colorways, vec!["b", "c", "d"]);
    }

    #[tokio::test]
    async fn ceiling_bounds_fetches() {
        let source = ScriptedSource::new(vec![
            Scripted::Records(vec![sneaker("Nike", "a")]),
            Scripted::Records(vec![sneaker("Nike", "b")]),
            Scripted::Records(vec![sneaker("Nike", "c")]),
        ]);
        let sink = MemorySink::default();
        let opts = IngestOptions {
            page_ceiling: Some(2),
            ..options()
        };
        let summary = run(&source, &sink, &opts).await;

        assert_eq!(source.calls(), 2);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.written, 2);
    }

    #[tokio::test]
    async fn connect_failure_before_any_page_is_fatal() {
        let source = ScriptedSource::new(vec![Scripted::Fail(FetchError::Transport {
            message: "connection refused".into(),
            connect: true,
        })]);
        let sink = MemorySink::default();
        let err = ingest(&source, &Normalizer::new(), &sink, &options(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FatalPrecondition(_)));
    }

    #[tokio::test]
    async fn connect_failure_after_progress_is_page_local() {
        let source = ScriptedSource::new(vec![
            Scripted::Records(vec![sneaker("Nike", "a")]),
            Scripted::Fail(FetchError::Transport {
                message: "connection refused".into(),
                connect: true,
            }),
        ]);
        let sink = MemorySink::default();
        let summary = run(&source, &sink, &options()).await;
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_fetching() {
        let source = ScriptedSource::new(vec![Scripted::Records(vec![sneaker("Nike", "a")])]);
        let sink = MemorySink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = ingest(&source, &Normalizer::new(), &sink, &options(), &cancel)
            .await
            .unwrap();
        assert_eq!(source.calls(), 0);
        assert!(summary.cancelled);
        assert_eq!(summary.status(), "cancelled");
    }

    #[tokio::test]
    async fn dry_run_never_writes() {
        let source = ScriptedSource::new(vec![Scripted::Records(vec![
            sneaker("Nike", "a"),
            sneaker("Nike", "b"),
        ])]);
        let sink = MemorySink::default();
        let opts = IngestOptions {
            dry_run: true,
            ..options()
        };
        let summary = run(&source, &sink, &opts).await;

        assert_eq!(summary.written, 2);
        assert!(sink.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_page_count_ends_run_without_empty_fetch() {
        let source = ScriptedSource::new(vec![
            Scripted::Hinted(vec![sneaker("Nike", "a")], 2),
            Scripted::Hinted(vec![sneaker("Nike", "b")], 2),
            Scripted::Records(vec![sneaker("Nike", "never")]),
        ]);
        let sink = MemorySink::default();
        let summary = run(&source, &sink, &options()).await;

        assert_eq!(*source.requested.lock().unwrap(), vec![1, 2]);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.written, 2);
    }

    /// Counts upload calls and always succeeds.
    #[derive(Default)]
    struct CountingHost {
        uploads: AtomicU32,
    }

    #[async_trait]
    impl AssetHost for CountingHost {
        async fn upload(&self, _image_url: &str) -> Result<HostedAsset, AssetUploadError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(HostedAsset {
                id: "1".to_string(),
                url: Some("/uploads/1.png".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn dry_run_never_uploads_images() {
        let with_image = json!({ "id": 1, "attributes": {
            "brand": "Nike", "colorway": "Panda",
            "image": { "original": "https://img.example.com/1.png" } } });
        let without_image = sneaker("Nike", "Bred");
        let source = ScriptedSource::new(vec![Scripted::Records(vec![with_image, without_image])]);
        let sink = MemorySink::default();
        let host = Arc::new(CountingHost::default());
        let normalizer = Normalizer::with_asset_host(host.clone());
        let opts = IngestOptions {
            dry_run: true,
            ..options()
        };

        let summary = ingest(&source, &normalizer, &sink, &opts, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(host.uploads.load(Ordering::SeqCst), 0);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.rejected, 1);
        assert!(sink.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rehost_uploads_outside_dry_run() {
        let with_image = json!({ "id": 1, "attributes": {
            "brand": "Nike", "colorway": "Panda",
            "image": { "original": "https://img.example.com/1.png" } } });
        let source = ScriptedSource::new(vec![Scripted::Records(vec![with_image])]);
        let sink = MemorySink::default();
        let host = Arc::new(CountingHost::default());
        let normalizer = Normalizer::with_asset_host(host.clone());

        ingest(&source, &normalizer, &sink, &options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(host.uploads.load(Ordering::SeqCst), 1);
        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows[0].image_asset_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn unrecorded_summary_is_not_an_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let sink = SqliteSink::new(pool.clone(), false);
        sink.begin_run().await.unwrap();

        let summary = RunSummary {
            pages: 1,
            ..Default::default()
        };
        assert!(record_finish(&sink, &summary).await);

        sqlx::query("DROP TABLE ingest_runs")
            .execute(&pool)
            .await
            .unwrap();
        assert!(!record_finish(&sink, &summary).await);
    }

    #[test]
    fn ceiling_uses_smaller_of_config_and_hint() {
        assert!(!past_ceiling(5, None, None));
        assert!(past_ceiling(3, Some(2), None));
        assert!(past_ceiling(3, None, Some(2)));
        assert!(past_ceiling(3, Some(10), Some(2)));
        assert!(!past_ceiling(2, Some(10), Some(2)));
    }
}
