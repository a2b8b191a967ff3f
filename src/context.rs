//! Application context
//!
//! Everything process-wide (configuration, repository, versioning engine,
//! remote source, activity log) is built once here and handed to the
//! orchestrators explicitly.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::config::Config;
use crate::crawler::{EventSource, RateLimiter, ScrapeClient};
use crate::scraper::{ActivityLog, ContinuousScraper, HistoricalBackfill, UpcomingRefresh};
use crate::storage::{create_sqlite_repository, SharedRepository};
use crate::versioning::VersioningEngine;

pub struct AppContext {
    pub config: Config,
    pub repository: SharedRepository,
    pub engine: Arc<VersioningEngine>,
    pub source: Arc<dyn EventSource>,
    pub activity: Arc<ActivityLog>,
}

impl AppContext {
    /// Open the SQLite store and build the HTTP client from `config`
    pub fn build(config: Config) -> Result<Self> {
        let repository = create_sqlite_repository(&config.database.sqlite_path).with_context(
            || {
                format!(
                    "Failed to open database: {}",
                    config.database.sqlite_path.display()
                )
            },
        )?;

        let engine = Arc::new(VersioningEngine::new(
            Arc::clone(&repository),
            config.constant_expectations()?,
        ));
        let source: Arc<dyn EventSource> =
            Arc::new(ScrapeClient::from_config(&config, Arc::clone(&engine))?);

        Ok(Self::assemble(config, repository, engine, source))
    }

    /// Build around an existing repository and source
    pub fn with_parts(
        config: Config,
        repository: SharedRepository,
        source: Arc<dyn EventSource>,
    ) -> Result<Self> {
        let engine = Arc::new(VersioningEngine::new(
            Arc::clone(&repository),
            config.constant_expectations()?,
        ));
        Ok(Self::assemble(config, repository, engine, source))
    }

    fn assemble(
        config: Config,
        repository: SharedRepository,
        engine: Arc<VersioningEngine>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        let activity = Arc::new(ActivityLog::new(config.scraper.activity_capacity));
        Self {
            config,
            repository,
            engine,
            source,
            activity,
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::from_millis(
            self.config.rate_limit.interval_ms,
            self.config.rate_limit.minimum_interval_ms,
        )
    }

    pub fn continuous_scraper(&self) -> Arc<ContinuousScraper> {
        Arc::new(ContinuousScraper::new(
            Arc::clone(&self.source),
            Arc::clone(&self.engine),
            self.rate_limiter(),
            Arc::clone(&self.activity),
            self.config.scraper.horizon_months,
            self.config.error_cooldown(),
        ))
    }

    /// Backfill over the given range, falling back to the configured one
    pub fn historical_backfill(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<HistoricalBackfill> {
        let start = start
            .or(self.config.scraper.historical_start)
            .context("No historical start date given or configured")?;
        let end = end
            .or(self.config.scraper.historical_end)
            .context("No historical end date given or configured")?;

        Ok(HistoricalBackfill::new(
            Arc::clone(&self.source),
            Arc::clone(&self.engine),
            self.rate_limiter(),
            Arc::clone(&self.activity),
            start,
            end,
        )?)
    }

    pub fn upcoming_refresh(&self) -> UpcomingRefresh {
        UpcomingRefresh::new(
            Arc::clone(&self.source),
            Arc::clone(&self.engine),
            self.rate_limiter(),
            Arc::clone(&self.activity),
            self.config.scraper.horizon_months,
        )
    }
}
