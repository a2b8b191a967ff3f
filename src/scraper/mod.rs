//! Scrape orchestrators
//!
//! Three drivers share the same per-day primitives (ensure session, fetch,
//! reconcile) and differ only in the dates they walk and how they react to
//! failures:
//!
//! - [`HistoricalBackfill`]: a closed past range; any update is fatal.
//! - [`UpcomingRefresh`]: today through the rolling horizon, once.
//! - [`ContinuousScraper`]: the rolling window, forever, until stopped.

pub mod activity;
pub mod continuous;
pub mod historical;
pub mod upcoming;

use std::collections::HashSet;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::crawler::{DayFetch, EventSource, RateLimiter};
use crate::error::{Error, Result};
use crate::models::{ScraperCursor, ScraperType};
use crate::versioning::{UpsertOutcome, VersioningEngine};

pub use activity::{ActivityEntry, ActivityLog, Severity};
pub use continuous::{next_date, ContinuousScraper, ScraperStatus};
pub use historical::HistoricalBackfill;
pub use upcoming::UpcomingRefresh;

/// Counts accumulated while reconciling fetched events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeCounts {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub reappeared: usize,
    pub marked_absent: usize,
}

impl ScrapeCounts {
    pub fn add(&mut self, other: &ScrapeCounts) {
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.reappeared += other.reappeared;
        self.marked_absent += other.marked_absent;
    }
}

impl std::fmt::Display for ScrapeCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} fetched, {} inserted, {} updated, {} unchanged, {} reappeared, {} marked absent",
            self.fetched,
            self.inserted,
            self.updated,
            self.unchanged,
            self.reappeared,
            self.marked_absent
        )
    }
}

/// Result of reconciling one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub counts: ScrapeCounts,
    /// When the day's request began, for the rate limiter
    #[serde(skip)]
    pub started: Instant,
}

impl std::fmt::Display for DaySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.date, self.counts)
    }
}

/// Outcome of a bounded run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RangeReport {
    pub scraper_type: ScraperType,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_attempted: usize,
    pub failed_days: Vec<NaiveDate>,
    pub totals: ScrapeCounts,
}

impl RangeReport {
    fn new(scraper_type: ScraperType, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            scraper_type,
            start,
            end,
            days_attempted: 0,
            failed_days: Vec::new(),
            totals: ScrapeCounts::default(),
        }
    }

    pub fn days_succeeded(&self) -> usize {
        self.days_attempted - self.failed_days.len()
    }
}

impl std::fmt::Display for RangeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}..={}: {}/{} days ok; {}",
            self.scraper_type,
            self.start,
            self.end,
            self.days_succeeded(),
            self.days_attempted,
            self.totals
        )
    }
}

/// Apply one day's fetch to storage
///
/// Only the continuous loop marks events absent. Every mode clears the
/// absence marker of fetched events that carry one, whatever date they are
/// now filed under, and refreshes `last_checked` of events whose stored
/// state already matched. In historical mode the first update aborts with
/// [`Error::HistoricalIntegrity`]; the offending update has already been
/// written by then.
pub fn reconcile_day(
    engine: &VersioningEngine,
    fetch: &DayFetch,
    mode: ScraperType,
) -> Result<DaySummary> {
    let mut counts = ScrapeCounts {
        fetched: fetch.events.len(),
        ..ScrapeCounts::default()
    };

    let fetched_ids: Vec<i64> = fetch.events.iter().map(|e| e.id).collect();
    let reappeared: Vec<i64> = engine
        .ids_marked_absent(&fetched_ids)?
        .into_iter()
        .collect();

    if mode == ScraperType::Continuous {
        let seen: HashSet<i64> = fetched_ids.iter().copied().collect();
        let vanished: Vec<i64> = engine
            .ids_scheduled_on(fetch.date)?
            .into_iter()
            .filter(|id| !seen.contains(id))
            .collect();
        counts.marked_absent = engine.mark_no_longer_found(&vanished)?;
    }
    counts.reappeared = engine.clear_no_longer_found(&reappeared)?;

    let mut unchanged = Vec::new();
    for event in &fetch.events {
        match engine.upsert(event)? {
            UpsertOutcome::Inserted => counts.inserted += 1,
            UpsertOutcome::Unchanged => {
                counts.unchanged += 1;
                unchanged.push(event.id);
            }
            UpsertOutcome::Updated { .. } if mode == ScraperType::Historical => {
                return Err(Error::HistoricalIntegrity {
                    event_id: event.id,
                    date: fetch.date,
                });
            }
            UpsertOutcome::Updated { .. } => counts.updated += 1,
        }
    }
    engine.touch_last_checked(&unchanged)?;

    Ok(DaySummary {
        date: fetch.date,
        counts,
        started: fetch.started,
    })
}

/// Ensure a session, fetch `date` and reconcile it
pub async fn scrape_day(
    source: &dyn EventSource,
    engine: &VersioningEngine,
    date: NaiveDate,
    mode: ScraperType,
) -> Result<DaySummary> {
    source.ensure_session().await?;
    let fetch = source.fetch_day(date).await?;
    reconcile_day(engine, &fetch, mode)
}

/// Shared day-by-day driver of the bounded orchestrators
pub(crate) struct RangeRunner<'a> {
    pub source: &'a dyn EventSource,
    pub engine: &'a VersioningEngine,
    pub rate_limiter: RateLimiter,
    pub activity: &'a ActivityLog,
    pub scraper_type: ScraperType,
}

impl RangeRunner<'_> {
    /// Walk `start..=end`; a failed day is logged and skipped unless the
    /// error is fatal
    pub async fn run(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeReport> {
        let mut report = RangeReport::new(self.scraper_type, start, end);
        let mut previous_start: Option<Instant> = None;

        info!(
            scraper = %self.scraper_type,
            start = %start,
            end = %end,
            "Starting bounded scrape"
        );

        for date in crate::utils::days_inclusive(start, end) {
            if let Some(started) = previous_start {
                tokio::time::sleep(self.rate_limiter.delay_since(started)).await;
            }
            let attempted = Instant::now();
            report.days_attempted += 1;

            match self.scrape_and_advance(date).await {
                Ok(summary) => {
                    previous_start = Some(summary.started);
                    info!(
                        scraper = %self.scraper_type,
                        date = %date,
                        fetched = summary.counts.fetched,
                        inserted = summary.counts.inserted,
                        updated = summary.counts.updated,
                        reappeared = summary.counts.reappeared,
                        "Day complete"
                    );
                    self.activity.info(format!("{}: {}", self.scraper_type, summary));
                    report.totals.add(&summary.counts);
                }
                Err(e) if e.is_fatal() => {
                    error!(scraper = %self.scraper_type, date = %date, error = %e, "Fatal error, halting");
                    self.activity
                        .error(format!("{} halted on {date}: {e}", self.scraper_type));
                    self.finish(date);
                    return Err(e);
                }
                Err(e) => {
                    previous_start = Some(attempted);
                    error!(scraper = %self.scraper_type, date = %date, error = %e, "Day failed, skipping");
                    self.activity
                        .error(format!("{} failed on {date}: {e}", self.scraper_type));
                    report.failed_days.push(date);
                }
            }
        }

        self.finish(end);
        info!(scraper = %self.scraper_type, report = %report, "Bounded scrape finished");
        Ok(report)
    }

    async fn scrape_and_advance(&self, date: NaiveDate) -> Result<DaySummary> {
        let summary = scrape_day(self.source, self.engine, date, self.scraper_type).await?;
        self.engine
            .repository()
            .save_cursor(&ScraperCursor::new(self.scraper_type, date))?;
        Ok(summary)
    }

    /// Leave the progress cursor disabled once the run is over
    fn finish(&self, fallback: NaiveDate) {
        let repository = self.engine.repository();
        let mut cursor = match repository.load_cursor(self.scraper_type) {
            Ok(Some(cursor)) => cursor,
            Ok(None) => ScraperCursor::new(self.scraper_type, fallback),
            Err(e) => {
                error!(scraper = %self.scraper_type, error = %e, "Failed to load cursor");
                return;
            }
        };
        cursor.enabled = false;
        cursor.updated_at = Utc::now();
        if let Err(e) = repository.save_cursor(&cursor) {
            error!(scraper = %self.scraper_type, error = %e, "Failed to save cursor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use crate::storage::{create_memory_repository, EventRepository};
    use crate::versioning::tests::sample_event;
    use crate::versioning::ConstantFieldExpectations;
    use chrono::Duration;

    fn engine() -> VersioningEngine {
        VersioningEngine::new(
            create_memory_repository(),
            ConstantFieldExpectations::default(),
        )
    }

    fn fetch(events: Vec<Event>) -> DayFetch {
        DayFetch {
            date: sample_event(0, "").scheduled_date(),
            events,
            started: Instant::now(),
        }
    }

    #[test]
    fn test_continuous_marks_vanished_and_clears_reappeared() {
        let engine = engine();
        reconcile_day(
            &engine,
            &fetch(vec![sample_event(1, "A"), sample_event(2, "B")]),
            ScraperType::Continuous,
        )
        .unwrap();

        let summary = reconcile_day(
            &engine,
            &fetch(vec![sample_event(1, "A")]),
            ScraperType::Continuous,
        )
        .unwrap();
        assert_eq!(summary.counts.marked_absent, 1);
        assert_eq!(summary.counts.unchanged, 1);
        assert!(engine.repository().find_event(2).unwrap().unwrap().is_absent());

        // Reappears, filed under a later date
        let mut moved = sample_event(2, "B");
        moved.event_start += Duration::days(2);
        let later = DayFetch {
            date: moved.scheduled_date(),
            events: vec![moved],
            started: Instant::now(),
        };
        let summary = reconcile_day(&engine, &later, ScraperType::Continuous).unwrap();
        assert_eq!(summary.started, later.started);
        assert_eq!(summary.counts.reappeared, 1);
        assert_eq!(summary.counts.updated, 1);
        assert!(!engine.repository().find_event(2).unwrap().unwrap().is_absent());
    }

    #[test]
    fn test_bounded_modes_never_mark_absent() {
        let engine = engine();
        reconcile_day(&engine, &fetch(vec![sample_event(1, "A")]), ScraperType::Upcoming).unwrap();

        let summary = reconcile_day(&engine, &fetch(vec![]), ScraperType::Upcoming).unwrap();
        assert_eq!(summary.counts.marked_absent, 0);
        assert!(!engine.repository().find_event(1).unwrap().unwrap().is_absent());
    }

    #[test]
    fn test_historical_rejects_updates() {
        let engine = engine();
        reconcile_day(&engine, &fetch(vec![sample_event(1, "A")]), ScraperType::Historical)
            .unwrap();

        // Re-running the same range is fine
        let summary =
            reconcile_day(&engine, &fetch(vec![sample_event(1, "A")]), ScraperType::Historical)
                .unwrap();
        assert_eq!(summary.counts.unchanged, 1);

        let err = reconcile_day(
            &engine,
            &fetch(vec![sample_event(1, "A (moved)")]),
            ScraperType::Historical,
        )
        .unwrap_err();
        assert!(matches!(err, Error::HistoricalIntegrity { event_id: 1, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_upcoming_tolerates_updates() {
        let engine = engine();
        reconcile_day(&engine, &fetch(vec![sample_event(1, "A")]), ScraperType::Upcoming).unwrap();
        let summary =
            reconcile_day(&engine, &fetch(vec![sample_event(1, "B")]), ScraperType::Upcoming)
                .unwrap();
        assert_eq!(summary.counts.updated, 1);
    }

    #[test]
    fn test_unchanged_events_get_last_checked_refreshed() {
        let engine = engine();
        let event = sample_event(1, "A");
        let old = Utc::now() - Duration::days(3);
        engine.repository().insert_event(&event, old).unwrap();

        reconcile_day(&engine, &fetch(vec![event]), ScraperType::Upcoming).unwrap();
        let stored = engine.repository().find_event(1).unwrap().unwrap();
        assert!(stored.last_checked > old);
        assert_eq!(stored.updated_at, old);
    }

    #[test]
    fn test_counts_display() {
        let counts = ScrapeCounts {
            fetched: 4,
            inserted: 1,
            updated: 1,
            unchanged: 2,
            reappeared: 0,
            marked_absent: 3,
        };
        assert_eq!(
            counts.to_string(),
            "4 fetched, 1 inserted, 1 updated, 2 unchanged, 0 reappeared, 3 marked absent"
        );
    }
}
