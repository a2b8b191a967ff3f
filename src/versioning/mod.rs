//! Change detection and versioning engine
//!
//! Reconciles freshly fetched events against their stored snapshots. Every
//! upsert that finds a difference archives the pre-update state and bumps the
//! live row's version by one; diff-empty upserts leave the row untouched.
//!
//! Archived history rows carry the version they were live as, so for an event
//! at version n the history holds versions 1 through n-1, each equal to the
//! live row's business fields right before the next update was applied.

pub mod constants;
pub mod fields;

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{ConstantFieldViolation, Event, EventHistory, StoredEvent};
use crate::storage::SharedRepository;
use crate::utils::error::StorageResult;

pub use constants::{ConstantFieldExpectations, ConstantMismatch};
pub use fields::{detect_changes, EventField, FieldChange};

/// Result of reconciling one fetched event
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// First observation, stored at version 1
    Inserted,
    /// Stored state differed; the previous snapshot was archived
    Updated {
        version: u32,
        changes: Vec<FieldChange>,
    },
    /// Stored state already matches
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

/// Versioning engine over a shared repository
pub struct VersioningEngine {
    repository: SharedRepository,
    expectations: ConstantFieldExpectations,
}

impl VersioningEngine {
    pub fn new(repository: SharedRepository, expectations: ConstantFieldExpectations) -> Self {
        Self {
            repository,
            expectations,
        }
    }

    pub fn repository(&self) -> &SharedRepository {
        &self.repository
    }

    /// Insert or reconcile `event` against its stored row
    pub fn upsert(&self, event: &Event) -> StorageResult<UpsertOutcome> {
        self.upsert_at(event, Utc::now())
    }

    /// [`upsert`](Self::upsert) with an explicit clock
    pub fn upsert_at(&self, event: &Event, now: DateTime<Utc>) -> StorageResult<UpsertOutcome> {
        let Some(stored) = self.repository.find_event(event.id)? else {
            self.repository.insert_event(event, now)?;
            debug!(event_id = event.id, "Inserted new event");
            return Ok(UpsertOutcome::Inserted);
        };

        match detect_changes(event, &stored.event) {
            None => Ok(UpsertOutcome::Unchanged),
            Some(changes) => {
                let version = self.update_event(&stored, event, &changes, now)?;
                Ok(UpsertOutcome::Updated { version, changes })
            }
        }
    }

    /// Archive `stored` and overwrite it with `fresh`; returns the new version
    ///
    /// Fails with `EventNotFound` when the live row has disappeared.
    pub fn update_event(
        &self,
        stored: &StoredEvent,
        fresh: &Event,
        changes: &[FieldChange],
        now: DateTime<Utc>,
    ) -> StorageResult<u32> {
        let snapshot = EventHistory {
            sequence: None,
            event: stored.event.clone(),
            version_number: stored.version_number,
            change_count: u32::try_from(changes.len()).unwrap_or(u32::MAX),
            archived_at: now,
            last_checked: stored.last_checked,
        };

        let version = self.repository.archive_and_update(&snapshot, fresh, now)?;

        debug!(
            event_id = fresh.id,
            version,
            changed = %changes
                .iter()
                .map(|c| c.field.name())
                .collect::<Vec<_>>()
                .join(","),
            "Archived event version"
        );
        Ok(version)
    }

    /// Set the absence marker where it is not already set
    pub fn mark_no_longer_found(&self, ids: &[i64]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.repository.mark_no_longer_found(ids, Utc::now())
    }

    /// Clear absence markers and refresh `last_checked`
    pub fn clear_no_longer_found(&self, ids: &[i64]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.repository.clear_no_longer_found(ids, Utc::now())
    }

    /// Refresh `last_checked` for events observed without changes
    pub fn touch_last_checked(&self, ids: &[i64]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.repository.touch_last_checked(ids, Utc::now())
    }

    pub fn ids_scheduled_on(&self, date: NaiveDate) -> StorageResult<HashSet<i64>> {
        self.repository.ids_scheduled_on(date)
    }

    pub fn ids_marked_absent(&self, ids: &[i64]) -> StorageResult<HashSet<i64>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        self.repository.ids_marked_absent(ids)
    }

    pub fn history(&self, id: i64) -> StorageResult<Vec<EventHistory>> {
        self.repository.history(id)
    }

    /// Compare presumed-constant fields and log any drift
    ///
    /// Never fails: storage errors while recording a violation are logged and
    /// the description is still returned.
    pub fn check_constant_fields(&self, event: &Event) -> Vec<String> {
        let detected_at = Utc::now();

        self.expectations
            .check(event)
            .into_iter()
            .map(|mismatch| {
                warn!(
                    event_id = event.id,
                    field = %mismatch.field,
                    expected = %mismatch.expected,
                    actual = %mismatch.actual,
                    "Constant field violation"
                );

                let violation = ConstantFieldViolation {
                    event_id: event.id,
                    field_name: mismatch.field.name().to_string(),
                    expected_value: value_text(&mismatch.expected),
                    actual_value: value_text(&mismatch.actual),
                    detected_at,
                };
                if let Err(e) = self.repository.record_violation(&violation) {
                    warn!(event_id = event.id, error = %e, "Failed to record violation");
                }

                format!("Event {}: {}", event.id, mismatch)
            })
            .collect()
    }
}

/// Plain text form of a JSON scalar (strings without quotes)
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
