//! Continuous rolling-window scraper
//!
//! Walks today through today + horizon one date per iteration, wraps back to
//! today, and repeats until stopped. Progress lives in the `continuous`
//! cursor row, so a restart resumes at the day after the last completed one.
//!
//! ```text
//!   STOPPED ──start()──▶ RUNNING ──stop()──▶ STOPPED
//!                         │   ▲
//!                 iteration   │ pause (rate limit, or cooldown after error)
//!                         ▼   │
//!                   fetch + reconcile + save cursor
//! ```
//!
//! Stopping is cooperative: an iteration in flight always completes, only
//! the pause between iterations is cut short.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{scrape_day, ActivityLog, DaySummary};
use crate::crawler::{EventSource, RateLimiter};
use crate::error::Result;
use crate::models::{ScraperCursor, ScraperType};
use crate::utils::horizon_end;
use crate::versioning::VersioningEngine;

/// Control-surface view of the loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScraperStatus {
    pub is_running: bool,
    pub is_enabled: bool,
    pub current_date: Option<NaiveDate>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Date to scrape after `current`
///
/// The day after `current`, or `today` when that day lies beyond the
/// rolling horizon or before today (a cursor left behind by a long stop).
pub fn next_date(current: NaiveDate, today: NaiveDate, horizon_months: u32) -> NaiveDate {
    match current.succ_opt() {
        Some(next) if next >= today && next <= horizon_end(today, horizon_months) => next,
        _ => today,
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct ContinuousScraper {
    source: Arc<dyn EventSource>,
    engine: Arc<VersioningEngine>,
    rate_limiter: RateLimiter,
    activity: Arc<ActivityLog>,
    horizon_months: u32,
    error_cooldown: Duration,
    today: fn() -> NaiveDate,

    running: AtomicBool,
    /// Bumped by every start; a loop exits once it no longer owns the latest
    generation: AtomicU64,
    stop_tx: watch::Sender<bool>,
}

impl ContinuousScraper {
    pub fn new(
        source: Arc<dyn EventSource>,
        engine: Arc<VersioningEngine>,
        rate_limiter: RateLimiter,
        activity: Arc<ActivityLog>,
        horizon_months: u32,
        error_cooldown: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);

        Self {
            source,
            engine,
            rate_limiter,
            activity,
            horizon_months,
            error_cooldown,
            today: local_today,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            stop_tx,
        }
    }

    /// Replace the clock used to determine "today"
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the background loop
    ///
    /// Returns `None` when the loop is already running. Otherwise the cursor
    /// is enabled (created at today if missing) and the spawned loop's
    /// handle is returned.
    pub fn start(self: &Arc<Self>) -> Result<Option<JoinHandle<()>>> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Continuous scraper already running");
            return Ok(None);
        }

        let (first_date, saved) = match self.enable_cursor() {
            Ok(dates) => dates,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_tx.send_replace(false);
        let stop_rx = self.stop_tx.subscribe();

        info!(start_date = %first_date, "Continuous scraper started");
        self.activity
            .info(format!("Continuous scraper started at {first_date}"));

        let scraper = Arc::clone(self);
        Ok(Some(tokio::spawn(async move {
            scraper.run_loop(generation, first_date, saved, stop_rx).await;
        })))
    }

    /// Request a cooperative stop and disable the cursor
    ///
    /// Returns whether the loop was running.
    pub fn stop(&self) -> Result<bool> {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.stop_tx.send_replace(true);

        let repository = self.engine.repository();
        if let Some(mut cursor) = repository.load_cursor(ScraperType::Continuous)? {
            cursor.enabled = false;
            cursor.updated_at = Utc::now();
            repository.save_cursor(&cursor)?;
        }

        if was_running {
            info!("Continuous scraper stop requested");
            self.activity.info("Continuous scraper stop requested");
        }
        Ok(was_running)
    }

    pub fn status(&self) -> Result<ScraperStatus> {
        let cursor = self
            .engine
            .repository()
            .load_cursor(ScraperType::Continuous)?;

        Ok(ScraperStatus {
            is_running: self.is_running(),
            is_enabled: cursor.as_ref().is_some_and(|c| c.enabled),
            current_date: cursor.as_ref().map(|c| c.current_date),
            last_update: cursor.map(|c| c.updated_at),
        })
    }

    /// Enable (or create) the cursor
    ///
    /// Returns the first date to scrape and the date the cursor now holds.
    fn enable_cursor(&self) -> Result<(NaiveDate, NaiveDate)> {
        let today = (self.today)();
        let repository = self.engine.repository();

        let (cursor, first_date) = match repository.load_cursor(ScraperType::Continuous)? {
            Some(mut cursor) => {
                cursor.enabled = true;
                cursor.updated_at = Utc::now();
                let next = next_date(cursor.current_date, today, self.horizon_months);
                (cursor, next)
            }
            None => (ScraperCursor::new(ScraperType::Continuous, today), today),
        };

        repository.save_cursor(&cursor)?;
        Ok((first_date, cursor.current_date))
    }

    fn owns_loop(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(
        self: Arc<Self>,
        generation: u64,
        mut date: NaiveDate,
        mut saved: NaiveDate,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        while self.owns_loop(generation) {
            let pause = match self.iterate(generation, date).await {
                Ok(summary) => {
                    info!(
                        date = %summary.date,
                        fetched = summary.counts.fetched,
                        inserted = summary.counts.inserted,
                        updated = summary.counts.updated,
                        reappeared = summary.counts.reappeared,
                        marked_absent = summary.counts.marked_absent,
                        "Continuous scrape day complete"
                    );
                    self.activity.info(summary.to_string());

                    saved = date;
                    date = next_date(date, (self.today)(), self.horizon_months);
                    self.rate_limiter.delay_since(summary.started)
                }
                Err(e) => {
                    error!(
                        date = %date,
                        error = %e,
                        category = %e.category(),
                        cooldown_secs = self.error_cooldown.as_secs(),
                        "Continuous scrape iteration failed"
                    );
                    self.activity.error(format!("{date}: {e}"));
                    self.error_cooldown
                }
            };

            if !self.owns_loop(generation) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stop_rx.changed() => {
                    continue;
                }
            }

            (date, saved) = self.resume_date(date, saved);
        }

        info!("Continuous scraper stopped");
        self.activity.info("Continuous scraper stopped");
    }

    async fn iterate(&self, generation: u64, date: NaiveDate) -> Result<DaySummary> {
        let summary = scrape_day(
            self.source.as_ref(),
            &self.engine,
            date,
            ScraperType::Continuous,
        )
        .await?;

        // A loop replaced by a newer start leaves the cursor to its successor;
        // a stopped one still records the day but keeps the stored flag
        if self.generation.load(Ordering::SeqCst) != generation {
            return Ok(summary);
        }

        let repository = self.engine.repository();
        let cursor = match repository.load_cursor(ScraperType::Continuous)? {
            Some(mut cursor) => {
                cursor.current_date = date;
                cursor.updated_at = Utc::now();
                cursor
            }
            None => ScraperCursor::new(ScraperType::Continuous, date),
        };
        repository.save_cursor(&cursor)?;

        Ok(summary)
    }

    /// Pick the date after a pause
    ///
    /// Keeps `planned` unless the persisted cursor no longer holds `saved`,
    /// the date this loop last wrote, in which case the edited cursor wins.
    /// Returns the date to scrape and the cursor date now known.
    fn resume_date(&self, planned: NaiveDate, saved: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self.engine.repository().load_cursor(ScraperType::Continuous) {
            Ok(Some(cursor)) if cursor.current_date != saved => {
                info!(
                    cursor_date = %cursor.current_date,
                    "Cursor moved externally, resuming after it"
                );
                let next = next_date(cursor.current_date, (self.today)(), self.horizon_months);
                (next, cursor.current_date)
            }
            Ok(_) => (planned, saved),
            Err(e) => {
                warn!(error = %e, "Failed to re-read cursor, continuing with planned date");
                (planned, saved)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::DayFetch;
    use crate::storage::create_memory_repository;
    use crate::versioning::ConstantFieldExpectations;
    use async_trait::async_trait;
    use std::time::Instant;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixed_today() -> NaiveDate {
        date(2026, 10, 16)
    }

    /// Source with no events on any date
    struct EmptySource;

    #[async_trait]
    impl EventSource for EmptySource {
        async fn ensure_session(&self) -> Result<()> {
            Ok(())
        }

        async fn fetch_day(&self, date: NaiveDate) -> Result<DayFetch> {
            Ok(DayFetch {
                date,
                events: Vec::new(),
                started: Instant::now(),
            })
        }
    }

    fn scraper() -> ContinuousScraper {
        let engine = Arc::new(VersioningEngine::new(
            create_memory_repository(),
            ConstantFieldExpectations::default(),
        ));
        ContinuousScraper::new(
            Arc::new(EmptySource),
            engine,
            RateLimiter::from_millis(0, 0),
            Arc::new(ActivityLog::new(10)),
            6,
            Duration::from_millis(10),
        )
        .with_today(fixed_today)
    }

    fn save_cursor(scraper: &ContinuousScraper, current: NaiveDate, enabled: bool) {
        let mut cursor = ScraperCursor::new(ScraperType::Continuous, current);
        cursor.enabled = enabled;
        scraper.engine.repository().save_cursor(&cursor).unwrap();
    }

    fn stored_cursor(scraper: &ContinuousScraper) -> ScraperCursor {
        scraper
            .engine
            .repository()
            .load_cursor(ScraperType::Continuous)
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_superseded_iteration_leaves_cursor_alone() {
        let scraper = scraper();
        save_cursor(&scraper, date(2026, 10, 20), true);
        scraper.generation.store(2, Ordering::SeqCst);
        scraper.running.store(true, Ordering::SeqCst);

        scraper.iterate(1, date(2026, 10, 21)).await.unwrap();

        let cursor = stored_cursor(&scraper);
        assert_eq!(cursor.current_date, date(2026, 10, 20));
        assert!(cursor.enabled);
    }

    #[tokio::test]
    async fn test_iteration_after_stop_keeps_cursor_disabled() {
        let scraper = scraper();
        save_cursor(&scraper, date(2026, 10, 20), false);
        scraper.generation.store(1, Ordering::SeqCst);

        scraper.iterate(1, date(2026, 10, 21)).await.unwrap();

        let cursor = stored_cursor(&scraper);
        assert_eq!(cursor.current_date, date(2026, 10, 21));
        assert!(!cursor.enabled);
    }

    #[test]
    fn test_resume_keeps_planned_date_when_cursor_untouched() {
        let scraper = scraper();
        let today = fixed_today();
        save_cursor(&scraper, today, true);

        // A failed first day: the cursor still holds the seed, today is retried
        assert_eq!(scraper.resume_date(today, today), (today, today));
    }

    #[test]
    fn test_resume_follows_externally_moved_cursor() {
        let scraper = scraper();
        save_cursor(&scraper, date(2026, 11, 3), true);

        let (next, saved) = scraper.resume_date(date(2026, 10, 18), date(2026, 10, 17));
        assert_eq!(next, date(2026, 11, 4));
        assert_eq!(saved, date(2026, 11, 3));
    }

    #[test]
    fn test_next_date_advances_one_day() {
        let today = date(2026, 10, 16);
        assert_eq!(next_date(today, today, 6), date(2026, 10, 17));
        assert_eq!(next_date(date(2026, 12, 31), today, 6), date(2027, 1, 1));
    }

    #[test]
    fn test_next_date_wraps_at_horizon() {
        let today = date(2026, 10, 16);
        let last = horizon_end(today, 6);
        assert_eq!(last, date(2027, 4, 16));

        assert_eq!(next_date(last.pred_opt().unwrap(), today, 6), last);
        assert_eq!(next_date(last, today, 6), today);
    }

    #[test]
    fn test_next_date_recovers_stale_cursor() {
        let today = date(2026, 10, 16);
        assert_eq!(next_date(date(2026, 1, 2), today, 6), today);
        assert_eq!(next_date(today.pred_opt().unwrap(), today, 6), today);
    }

    #[test]
    fn test_next_date_at_max_date() {
        assert_eq!(next_date(NaiveDate::MAX, date(2026, 10, 16), 6), date(2026, 10, 16));
    }
}
