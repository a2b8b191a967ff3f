//! Bounded in-memory activity log
//!
//! Holds the most recent scrape summaries for status reporting. Not
//! persisted; a restart starts empty.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One line of the activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
}

/// Ring buffer of the last `capacity` entries
#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    entries: Mutex<VecDeque<ActivityEntry>>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest when full
    pub fn record(&self, severity: Severity, message: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            timestamp: Utc::now(),
            message: message.into(),
            severity,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(Severity::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.record(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(Severity::Error, message);
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<ActivityEntry> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(100)
    }
}
