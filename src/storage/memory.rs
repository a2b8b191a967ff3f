//! In-memory implementation of the repository traits
//!
//! Mirrors the SQLite semantics; used by tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};

use super::{CursorRepository, EventRepository};
use crate::models::{
    ConstantFieldViolation, Event, EventHistory, ScraperCursor, ScraperType, StoredEvent,
};
use crate::utils::error::{StorageError, StorageResult};

#[derive(Default)]
struct MemoryState {
    events: HashMap<i64, StoredEvent>,
    history: Vec<EventHistory>,
    next_sequence: i64,
    violations: Vec<ConstantFieldViolation>,
    cursors: HashMap<ScraperType, ScraperCursor>,
}

/// In-memory repository
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventRepository for MemoryRepository {
    fn find_event(&self, id: i64) -> StorageResult<Option<StoredEvent>> {
        Ok(self.read().events.get(&id).cloned())
    }

    fn insert_event(&self, event: &Event, now: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.write();
        if state.events.contains_key(&event.id) {
            return Err(StorageError::DuplicateEvent(event.id));
        }

        state.events.insert(
            event.id,
            StoredEvent {
                event: event.clone(),
                version_number: 1,
                created_at: now,
                updated_at: now,
                last_checked: now,
                no_longer_found_at: None,
            },
        );
        Ok(())
    }

    fn archive_and_update(
        &self,
        history: &EventHistory,
        fresh: &Event,
        now: DateTime<Utc>,
    ) -> StorageResult<u32> {
        let mut state = self.write();
        if !state.events.contains_key(&fresh.id) {
            return Err(StorageError::EventNotFound(fresh.id));
        }

        state.next_sequence += 1;
        let mut archived = history.clone();
        archived.sequence = Some(state.next_sequence);
        state.history.push(archived);

        let live = state
            .events
            .get_mut(&fresh.id)
            .ok_or(StorageError::EventNotFound(fresh.id))?;
        live.event = fresh.clone();
        live.version_number += 1;
        live.updated_at = now;
        live.last_checked = now;
        Ok(live.version_number)
    }

    fn history(&self, id: i64) -> StorageResult<Vec<EventHistory>> {
        let mut history: Vec<EventHistory> = self
            .read()
            .history
            .iter()
            .filter(|h| h.event.id == id)
            .cloned()
            .collect();
        history.sort_by_key(|h| (h.version_number, h.sequence));
        Ok(history)
    }

    fn ids_scheduled_on(&self, date: NaiveDate) -> StorageResult<HashSet<i64>> {
        Ok(self
            .read()
            .events
            .values()
            .filter(|stored| stored.event.scheduled_date() == date)
            .map(|stored| stored.event.id)
            .collect())
    }

    fn ids_marked_absent(&self, ids: &[i64]) -> StorageResult<HashSet<i64>> {
        let state = self.read();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| state.events.get(id).is_some_and(StoredEvent::is_absent))
            .collect())
    }

    fn mark_no_longer_found(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.write();
        let mut changed = 0;
        for id in ids {
            if let Some(stored) = state.events.get_mut(id) {
                if stored.no_longer_found_at.is_none() {
                    stored.no_longer_found_at = Some(now);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    fn clear_no_longer_found(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.write();
        let mut changed = 0;
        for id in ids {
            if let Some(stored) = state.events.get_mut(id) {
                stored.no_longer_found_at = None;
                stored.last_checked = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn touch_last_checked(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.write();
        let mut changed = 0;
        for id in ids {
            if let Some(stored) = state.events.get_mut(id) {
                stored.last_checked = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn record_violation(&self, violation: &ConstantFieldViolation) -> StorageResult<()> {
        self.write().violations.push(violation.clone());
        Ok(())
    }

    fn violations(&self, limit: usize) -> StorageResult<Vec<ConstantFieldViolation>> {
        let state = self.read();
        // Stable sort keeps insertion order among equal timestamps; reverse
        // afterwards so the latest insert wins ties, as in SQLite.
        let mut violations = state.violations.clone();
        violations.sort_by_key(|v| v.detected_at);
        violations.reverse();
        violations.truncate(limit);
        Ok(violations)
    }

    fn event_count(&self) -> StorageResult<usize> {
        Ok(self.read().events.len())
    }
}

impl CursorRepository for MemoryRepository {
    fn load_cursor(&self, scraper_type: ScraperType) -> StorageResult<Option<ScraperCursor>> {
        Ok(self.read().cursors.get(&scraper_type).cloned())
    }

    fn save_cursor(&self, cursor: &ScraperCursor) -> StorageResult<()> {
        self.write()
            .cursors
            .insert(cursor.scraper_type, cursor.clone());
        Ok(())
    }

    fn list_cursors(&self) -> StorageResult<Vec<ScraperCursor>> {
        let mut cursors: Vec<ScraperCursor> = self.read().cursors.values().cloned().collect();
        cursors.sort_by_key(|c| c.scraper_type.as_str());
        Ok(cursors)
    }
}
