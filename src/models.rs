// Core data structures for the roomwatch scraper

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business fields of one reservation event as published by the source
///
/// `id` is the stable external identity; every other field participates in
/// change detection (see [`crate::versioning::fields::EventField`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub event_name: String,
    pub event_start: NaiveDateTime, // local wall-clock time
    pub event_end: NaiveDateTime,
    pub gmt_start: NaiveDateTime,
    pub gmt_end: NaiveDateTime,
    pub booking_start: NaiveDateTime, // includes setup time
    pub booking_end: NaiveDateTime,   // includes teardown time
    pub is_all_day: bool,
    pub timezone_abbreviation: String,
    pub building: String,
    pub building_id: i64,
    pub building_code: String,
    pub room: String,
    pub room_id: i64,
    pub room_code: String,
    pub room_type: String,
    pub room_type_id: i64,
    pub group_name: String,
    pub reservation_id: i64,
    pub reservation_url: String,
    pub status_id: i64,
    pub status_type_id: i64,
    pub is_owner: bool,
}

impl Event {
    /// Calendar date the event is scheduled on (local start date)
    pub fn scheduled_date(&self) -> NaiveDate {
        self.event_start.date()
    }
}

/// Live snapshot row: the event plus versioning metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event: Event,
    pub version_number: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
    pub no_longer_found_at: Option<DateTime<Utc>>,
}

impl StoredEvent {
    /// Whether the event is currently marked as missing from the source
    pub fn is_absent(&self) -> bool {
        self.no_longer_found_at.is_some()
    }
}

/// Archived pre-update snapshot of an event
///
/// `version_number` is the version this snapshot was live as, i.e. the
/// version being replaced by the update that archived it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHistory {
    pub sequence: Option<i64>, // assigned by storage
    pub event: Event,
    pub version_number: u32,
    pub change_count: u32,
    pub archived_at: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,
}

/// Scraper variants that own a cursor row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScraperType {
    Continuous,
    Upcoming,
    Historical,
}

impl ScraperType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Upcoming => "upcoming",
            Self::Historical => "historical",
        }
    }

    /// Parse from the stored string form
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "continuous" => Some(Self::Continuous),
            "upcoming" => Some(Self::Upcoming),
            "historical" => Some(Self::Historical),
            _ => None,
        }
    }

    /// Get all scraper types
    pub fn all() -> Vec<Self> {
        vec![Self::Continuous, Self::Upcoming, Self::Historical]
    }
}

impl std::fmt::Display for ScraperType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted resume point of one scraper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperCursor {
    pub scraper_type: ScraperType,
    pub current_date: NaiveDate, // last fully processed date
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl ScraperCursor {
    /// Create an enabled cursor positioned at `date`
    pub fn new(scraper_type: ScraperType, date: NaiveDate) -> Self {
        Self {
            scraper_type,
            current_date: date,
            enabled: true,
            updated_at: Utc::now(),
        }
    }
}

/// Advisory record of a presumed-constant field holding an unexpected value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantFieldViolation {
    pub event_id: i64,
    pub field_name: String,
    pub expected_value: String,
    pub actual_value: String,
    pub detected_at: DateTime<Utc>,
}
