//! # sneakr
//!
//! Paginated ingestion of a third-party sneaker catalog into a local SQLite
//! store, plus a few read-side commands for operators.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Catalog API  │──▶│  Normalizer  │──▶│    SQLite    │
//! │ (paginated)  │   │ (+ re-host)  │   │  sneakers    │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                                              ▼
//!                                  search / list / get / stats
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sneakr init                          # create database
//! sneakr sync                          # ingest until upstream runs dry
//! sneakr sync --page-ceiling 10        # stop after page 10 at the latest
//! sneakr search "jordan bred"
//! sneakr stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Upstream/normalized records, page and run counters |
//! | [`error`] | Fatal, page-local and record-local error kinds |
//! | [`traits`] | `PageSource`, `RecordSink`, `AssetHost` seams |
//! | [`connector_catalog`] | HTTP page fetcher for the upstream catalog |
//! | [`normalize`] | Validation and defaulting of upstream records |
//! | [`rehost`] | Optional image re-hosting client |
//! | [`sqlite_store`] | SQLite record sink and run bookkeeping |
//! | [`ingest`] | Ingestion driver state machine (`sneakr sync`) |
//! | [`search`] | Keyword search and paged listing |
//! | [`get`] | Single sneaker by id |
//! | [`stats`] | Counts and run history |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`logging`] | tracing subscriber setup |

pub mod config;
pub mod connector_catalog;
pub mod db;
pub mod error;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod rehost;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod traits;

pub use error::{FetchError, IngestError, Rejection};
pub use ingest::{ingest, IngestOptions};
pub use models::{Gender, NormalizedRecord, RunSummary};
pub use normalize::Normalizer;
pub use traits::{AssetHost, Page, PageSource, RecordSink};
