//! roomwatch - Room reservation change tracker
//!
//! Polls a room-reservation system one calendar date at a time, stores every
//! booking it sees, and keeps a versioned history of how each booking changed.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Session tokens, the per-day fetcher and rate limiting
//! - [`versioning`] - Change detection, archival and constant-field checks
//! - [`scraper`] - Historical, upcoming and continuous orchestrators
//! - [`models`] - Core data structures and types
//! - [`storage`] - Repository traits with SQLite and in-memory backends
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use roomwatch::config::Config;
//! use roomwatch::context::AppContext;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let ctx = AppContext::build(config)?;
//!     let report = ctx.upcoming_refresh().run().await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod crawler;
pub mod error;
pub mod models;
pub mod scraper;
pub mod storage;
pub mod utils;
pub mod versioning;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::AppContext;
    pub use crate::crawler::{EventSource, ScrapeClient};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{Event, EventHistory, ScraperCursor, ScraperType, StoredEvent};
    pub use crate::scraper::{
        ContinuousScraper, HistoricalBackfill, RangeReport, UpcomingRefresh,
    };
    pub use crate::storage::{CursorRepository, EventRepository, SharedRepository};
    pub use crate::versioning::{UpsertOutcome, VersioningEngine};
}

// Direct re-exports for convenience
pub use models::{Event, ScraperType, StoredEvent};
