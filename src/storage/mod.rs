//! Repository Pattern for event persistence
//!
//! Trait-based repository abstractions that decouple the versioning engine
//! and the scrapers from the backing store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        VersioningEngine / Scrapers / CLI commands           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        EventRepository + CursorRepository traits            │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                            │
//!                  ▼                            ▼
//!        ┌──────────────────┐        ┌──────────────────┐
//!        │ SqliteRepository │        │ MemoryRepository │
//!        └──────────────────┘        └──────────────────┘
//! ```
//!
//! Logical tables: current snapshots keyed by external event id, the
//! append-only history keyed by (event id, version), one cursor row per
//! scraper type, and the append-only constant-field violation log.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    ConstantFieldViolation, Event, EventHistory, ScraperCursor, ScraperType, StoredEvent,
};
use crate::utils::error::StorageResult;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

// ============================================================================
// Repository Traits
// ============================================================================

/// Snapshot, history and violation storage
pub trait EventRepository: Send + Sync {
    /// Get the live row for an event
    fn find_event(&self, id: i64) -> StorageResult<Option<StoredEvent>>;

    /// Insert a first observation at version 1 with every timestamp set to `now`
    fn insert_event(&self, event: &Event, now: DateTime<Utc>) -> StorageResult<()>;

    /// Append `history` and overwrite the live row with `fresh` in one unit
    ///
    /// Increments `version_number`, sets `updated_at` and `last_checked` to
    /// `now` and returns the new version. Fails with
    /// [`StorageError::EventNotFound`](crate::utils::error::StorageError::EventNotFound)
    /// when no live row exists.
    fn archive_and_update(
        &self,
        history: &EventHistory,
        fresh: &Event,
        now: DateTime<Utc>,
    ) -> StorageResult<u32>;

    /// Archived snapshots for an event, ordered by version
    fn history(&self, id: i64) -> StorageResult<Vec<EventHistory>>;

    /// Ids of stored events whose local start falls on `date`
    fn ids_scheduled_on(&self, date: NaiveDate) -> StorageResult<HashSet<i64>>;

    /// Subset of `ids` currently carrying a no-longer-found marker
    fn ids_marked_absent(&self, ids: &[i64]) -> StorageResult<HashSet<i64>>;

    /// Set the marker where it is null; returns rows changed
    fn mark_no_longer_found(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize>;

    /// Clear the marker and refresh `last_checked`; returns rows touched
    fn clear_no_longer_found(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize>;

    /// Refresh `last_checked` only; returns rows touched
    fn touch_last_checked(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize>;

    /// Append a constant-field violation
    fn record_violation(&self, violation: &ConstantFieldViolation) -> StorageResult<()>;

    /// Most recent violations, newest first
    fn violations(&self, limit: usize) -> StorageResult<Vec<ConstantFieldViolation>>;

    /// Number of live event rows
    fn event_count(&self) -> StorageResult<usize>;
}

/// Scraper cursor storage (last writer wins)
pub trait CursorRepository: Send + Sync {
    /// Load the cursor of one scraper
    fn load_cursor(&self, scraper_type: ScraperType) -> StorageResult<Option<ScraperCursor>>;

    /// Insert or replace a cursor
    fn save_cursor(&self, cursor: &ScraperCursor) -> StorageResult<()>;

    /// All cursors
    fn list_cursors(&self) -> StorageResult<Vec<ScraperCursor>>;
}

/// Full storage surface used by the application
pub trait Repository: EventRepository + CursorRepository {}

impl<T: EventRepository + CursorRepository> Repository for T {}

/// Thread-safe shared repository
pub type SharedRepository = Arc<dyn Repository>;

/// Create a shared SQLite repository at `path`
pub fn create_sqlite_repository(path: impl AsRef<Path>) -> StorageResult<SharedRepository> {
    Ok(Arc::new(SqliteRepository::new(path)?))
}

/// Create a shared in-memory repository
pub fn create_memory_repository() -> SharedRepository {
    Arc::new(MemoryRepository::new())
}

// ============================================================================
// Tests (shared by both implementations)
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::StorageError;
    use crate::versioning::tests::sample_event;
    use chrono::Duration;

    fn create_test_repos() -> Vec<Box<dyn Repository>> {
        vec![
            Box::new(SqliteRepository::in_memory().unwrap()),
            Box::new(MemoryRepository::new()),
        ]
    }

    fn snapshot(stored: &StoredEvent, change_count: u32, now: DateTime<Utc>) -> EventHistory {
        EventHistory {
            sequence: None,
            event: stored.event.clone(),
            version_number: stored.version_number,
            change_count,
            archived_at: now,
            last_checked: stored.last_checked,
        }
    }

    #[test]
    fn test_insert_and_find() {
        for repo in create_test_repos() {
            let now = Utc::now();
            let event = sample_event(500, "Seminar A");
            repo.insert_event(&event, now).unwrap();

            let stored = repo.find_event(500).unwrap().unwrap();
            assert_eq!(stored.event, event);
            assert_eq!(stored.version_number, 1);
            assert_eq!(stored.created_at.timestamp(), now.timestamp());
            assert_eq!(stored.updated_at.timestamp(), now.timestamp());
            assert_eq!(stored.last_checked.timestamp(), now.timestamp());
            assert!(stored.no_longer_found_at.is_none());

            assert!(repo.find_event(501).unwrap().is_none());
            assert_eq!(repo.event_count().unwrap(), 1);
        }
    }

    #[test]
    fn test_archive_and_update() {
        for repo in create_test_repos() {
            let t0 = Utc::now() - Duration::hours(1);
            repo.insert_event(&sample_event(500, "Seminar A"), t0).unwrap();
            let stored = repo.find_event(500).unwrap().unwrap();

            let t1 = Utc::now();
            let version = repo
                .archive_and_update(
                    &snapshot(&stored, 1, t1),
                    &sample_event(500, "Seminar B"),
                    t1,
                )
                .unwrap();
            assert_eq!(version, 2);

            let live = repo.find_event(500).unwrap().unwrap();
            assert_eq!(live.version_number, 2);
            assert_eq!(live.event.event_name, "Seminar B");
            assert_eq!(live.created_at.timestamp(), t0.timestamp());
            assert_eq!(live.updated_at.timestamp(), t1.timestamp());

            let history = repo.history(500).unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].event.event_name, "Seminar A");
            assert_eq!(history[0].version_number, 1);
            assert_eq!(history[0].change_count, 1);
            assert!(history[0].sequence.is_some());
        }
    }

    #[test]
    fn test_archive_and_update_missing_event() {
        for repo in create_test_repos() {
            let now = Utc::now();
            let ghost = StoredEvent {
                event: sample_event(9, "Ghost"),
                version_number: 1,
                created_at: now,
                updated_at: now,
                last_checked: now,
                no_longer_found_at: None,
            };

            let result = repo.archive_and_update(&snapshot(&ghost, 1, now), &ghost.event, now);
            assert!(matches!(result, Err(StorageError::EventNotFound(9))));
            assert!(repo.history(9).unwrap().is_empty());
        }
    }

    #[test]
    fn test_ids_scheduled_on() {
        for repo in create_test_repos() {
            let now = Utc::now();
            let mut late = sample_event(2, "Late");
            late.event_start = late.event_start.date().and_hms_opt(23, 30, 0).unwrap();
            let mut next_day = sample_event(3, "Tomorrow");
            next_day.event_start += Duration::days(1);

            repo.insert_event(&sample_event(1, "Morning"), now).unwrap();
            repo.insert_event(&late, now).unwrap();
            repo.insert_event(&next_day, now).unwrap();

            let day = sample_event(1, "x").scheduled_date();
            let ids = repo.ids_scheduled_on(day).unwrap();
            assert_eq!(ids, HashSet::from([1, 2]));
        }
    }

    #[test]
    fn test_mark_no_longer_found_is_idempotent() {
        for repo in create_test_repos() {
            let now = Utc::now();
            repo.insert_event(&sample_event(1, "A"), now).unwrap();
            repo.insert_event(&sample_event(2, "B"), now).unwrap();

            assert_eq!(repo.mark_no_longer_found(&[1, 2, 99], now).unwrap(), 2);
            assert_eq!(repo.mark_no_longer_found(&[1, 2], now).unwrap(), 0);

            let first_mark = repo.find_event(1).unwrap().unwrap().no_longer_found_at;
            repo.mark_no_longer_found(&[1], now + Duration::hours(1)).unwrap();
            assert_eq!(
                repo.find_event(1).unwrap().unwrap().no_longer_found_at,
                first_mark
            );

            assert_eq!(
                repo.ids_marked_absent(&[1, 2, 3]).unwrap(),
                HashSet::from([1, 2])
            );
        }
    }

    #[test]
    fn test_clear_then_mark_again() {
        for repo in create_test_repos() {
            let t0 = Utc::now() - Duration::hours(2);
            repo.insert_event(&sample_event(1, "A"), t0).unwrap();
            repo.mark_no_longer_found(&[1], t0).unwrap();

            let t1 = Utc::now();
            assert_eq!(repo.clear_no_longer_found(&[1], t1).unwrap(), 1);
            let cleared = repo.find_event(1).unwrap().unwrap();
            assert!(cleared.no_longer_found_at.is_none());
            assert_eq!(cleared.last_checked.timestamp(), t1.timestamp());

            assert_eq!(repo.mark_no_longer_found(&[1], t1).unwrap(), 1);
            assert!(repo.find_event(1).unwrap().unwrap().is_absent());
        }
    }

    #[test]
    fn test_touch_last_checked() {
        for repo in create_test_repos() {
            let t0 = Utc::now() - Duration::days(1);
            repo.insert_event(&sample_event(1, "A"), t0).unwrap();

            let t1 = Utc::now();
            assert_eq!(repo.touch_last_checked(&[1, 2], t1).unwrap(), 1);
            let stored = repo.find_event(1).unwrap().unwrap();
            assert_eq!(stored.last_checked.timestamp(), t1.timestamp());
            assert_eq!(stored.updated_at.timestamp(), t0.timestamp());
            assert_eq!(repo.touch_last_checked(&[], t1).unwrap(), 0);
        }
    }

    #[test]
    fn test_violations_newest_first() {
        for repo in create_test_repos() {
            let t0 = Utc::now() - Duration::minutes(5);
            for (i, field) in ["timezone_abbreviation", "is_owner", "status_type_id"]
                .iter()
                .enumerate()
            {
                repo.record_violation(&ConstantFieldViolation {
                    event_id: 1,
                    field_name: field.to_string(),
                    expected_value: "a".into(),
                    actual_value: "b".into(),
                    detected_at: t0 + Duration::minutes(i as i64),
                })
                .unwrap();
            }

            let latest = repo.violations(2).unwrap();
            assert_eq!(latest.len(), 2);
            assert_eq!(latest[0].field_name, "status_type_id");
            assert_eq!(latest[1].field_name, "is_owner");
        }
    }

    #[test]
    fn test_cursor_round_trip() {
        for repo in create_test_repos() {
            assert!(repo.load_cursor(ScraperType::Continuous).unwrap().is_none());

            let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
            let mut cursor = ScraperCursor::new(ScraperType::Continuous, date);
            repo.save_cursor(&cursor).unwrap();

            cursor.enabled = false;
            cursor.current_date = date.succ_opt().unwrap();
            repo.save_cursor(&cursor).unwrap();

            let loaded = repo.load_cursor(ScraperType::Continuous).unwrap().unwrap();
            assert!(!loaded.enabled);
            assert_eq!(loaded.current_date, date.succ_opt().unwrap());
            assert_eq!(repo.list_cursors().unwrap().len(), 1);
            assert!(repo.load_cursor(ScraperType::Upcoming).unwrap().is_none());
        }
    }
}
