//! # ptdump
//!
//! Dumps a Pivotal Tracker project into a SQLite database: the project, its
//! members, labels, stories with their owners and labels, comments, and the
//! content of every file attachment. Usable both as a standalone binary and
//! as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ptdump::export::{Exporter, ExportOptions, LogProgress};
//! use ptdump::store::{SqliteStore, schema};
//! use ptdump::tracker::{RateLimit, RateLimiter, TrackerClient, DEFAULT_TRACKER_HOST};
//!
//! let limiter = Arc::new(RateLimiter::new(RateLimit::default()));
//! let client = TrackerClient::new(DEFAULT_TRACKER_HOST, "token", Duration::from_secs(60), limiter)?;
//! let store = SqliteStore::new("dump.db")?;
//! let mut progress = LogProgress::new();
//!
//! let options = ExportOptions { project_id: 42, page_size: 100, migrations: schema::embedded() };
//! let summary = Exporter::new(&client, &store, &mut progress, options).run().await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): builds the `ptdump` binary.

pub mod attachments;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod store;
pub mod tracker;
pub mod types;
pub mod verify;
