//! Bounded historical backfill
//!
//! Loads a closed range of past dates into an empty (or previously
//! backfilled) store. Past listings no longer change, so an event that
//! resolves to an update means the range overlaps data that is already
//! being tracked; the run halts with [`Error::HistoricalIntegrity`].

use std::sync::Arc;

use chrono::NaiveDate;

use super::{ActivityLog, RangeReport, RangeRunner};
use crate::crawler::{EventSource, RateLimiter};
use crate::error::{Error, Result};
use crate::models::ScraperType;
use crate::versioning::VersioningEngine;

pub struct HistoricalBackfill {
    source: Arc<dyn EventSource>,
    engine: Arc<VersioningEngine>,
    rate_limiter: RateLimiter,
    activity: Arc<ActivityLog>,
    start: NaiveDate,
    end: NaiveDate,
}

impl HistoricalBackfill {
    /// Backfill `start..=end`
    ///
    /// # Errors
    ///
    /// `Error::Config` when `start` is after `end`.
    pub fn new(
        source: Arc<dyn EventSource>,
        engine: Arc<VersioningEngine>,
        rate_limiter: RateLimiter,
        activity: Arc<ActivityLog>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self> {
        if start > end {
            return Err(Error::config(format!(
                "historical range start {start} is after end {end}"
            )));
        }

        Ok(Self {
            source,
            engine,
            rate_limiter,
            activity,
            start,
            end,
        })
    }

    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }

    /// Walk the range once
    ///
    /// Failed days are skipped and listed in the report; an integrity
    /// violation stops the run immediately and is returned as the error.
    pub async fn run(&self) -> Result<RangeReport> {
        RangeRunner {
            source: self.source.as_ref(),
            engine: &self.engine,
            rate_limiter: self.rate_limiter,
            activity: &self.activity,
            scraper_type: ScraperType::Historical,
        }
        .run(self.start, self.end)
        .await
    }
}
