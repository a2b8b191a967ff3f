//! Bounded upcoming refresh
//!
//! One pass over today through the rolling horizon. Updates are expected
//! here since the window overlaps what the continuous loop tracks. Meant to
//! be invoked periodically by an external timer.

use std::sync::Arc;

use chrono::{Local, NaiveDate};

use super::{ActivityLog, RangeReport, RangeRunner};
use crate::crawler::{EventSource, RateLimiter};
use crate::error::Result;
use crate::models::ScraperType;
use crate::utils::horizon_end;
use crate::versioning::VersioningEngine;

pub struct UpcomingRefresh {
    source: Arc<dyn EventSource>,
    engine: Arc<VersioningEngine>,
    rate_limiter: RateLimiter,
    activity: Arc<ActivityLog>,
    horizon_months: u32,
}

impl UpcomingRefresh {
    pub fn new(
        source: Arc<dyn EventSource>,
        engine: Arc<VersioningEngine>,
        rate_limiter: RateLimiter,
        activity: Arc<ActivityLog>,
        horizon_months: u32,
    ) -> Self {
        Self {
            source,
            engine,
            rate_limiter,
            activity,
            horizon_months,
        }
    }

    /// Refresh from the local date today
    pub async fn run(&self) -> Result<RangeReport> {
        self.run_from(Local::now().date_naive()).await
    }

    /// Refresh `today..=today + horizon`
    pub async fn run_from(&self, today: NaiveDate) -> Result<RangeReport> {
        RangeRunner {
            source: self.source.as_ref(),
            engine: &self.engine,
            rate_limiter: self.rate_limiter,
            activity: &self.activity,
            scraper_type: ScraperType::Upcoming,
        }
        .run(today, horizon_end(today, self.horizon_months))
        .await
    }
}
