//! Common test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};

use roomwatch::crawler::{DayFetch, EventSource};
use roomwatch::error::{Error, FetchError, Result};
use roomwatch::models::Event;
use roomwatch::scraper::ActivityLog;
use roomwatch::storage::SharedRepository;
use roomwatch::versioning::{ConstantFieldExpectations, VersioningEngine};

pub const TOKEN_PAGE_PATH: &str = "/BrowseEvents.aspx";
pub const BOOKINGS_PATH: &str = "/ServerApi.aspx/BrowseEvents";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Session page embedding `token` the way the reservation system does
pub fn session_page(token: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><body>
<form id="browse">
<input type="hidden" name="deaCSRFToken" value="{token}" />
</form>
</body></html>"#
    )
}

/// One booking in the source's wire format, starting at `start` local time
pub fn booking_json(id: i64, start: &str, name: &str) -> Value {
    json!({
        "Id": id,
        "EventName": name,
        "EventStart": start,
        "EventEnd": start,
        "GmtStart": start,
        "GmtEnd": start,
        "TimeBookingStart": start,
        "TimeBookingEnd": start,
        "IsAllDayEvent": false,
        "TimezoneAbbreviation": "ET",
        "Building": "Main Library",
        "BuildingId": 12,
        "BuildingCode": "LIB",
        "Room": "Room 101",
        "RoomId": 345,
        "RoomCode": "LIB-101",
        "RoomType": "Seminar Room",
        "RoomTypeId": 7,
        "GroupName": "Graduate Studies",
        "ReservationId": 9000 + id,
        "ReservationUrl": format!("/reservations/{}", 9000 + id),
        "StatusId": 1,
        "StatusTypeId": -14,
        "IsEventOwner": false
    })
}

/// Wrap bookings in the `{"d": "<json string>"}` envelope
pub fn envelope(bookings: Vec<Value>) -> String {
    let inner = json!({ "DailyBookingResults": bookings }).to_string();
    json!({ "d": inner }).to_string()
}

/// An event on `day` from 09:00 to 10:00 local
pub fn event_on(id: i64, name: &str, day: NaiveDate) -> Event {
    let start = day.and_hms_opt(9, 0, 0).unwrap();
    let end = day.and_hms_opt(10, 0, 0).unwrap();

    Event {
        id,
        event_name: name.to_string(),
        event_start: start,
        event_end: end,
        gmt_start: start + Duration::hours(4),
        gmt_end: end + Duration::hours(4),
        booking_start: start - Duration::minutes(15),
        booking_end: end + Duration::minutes(15),
        is_all_day: false,
        timezone_abbreviation: "ET".to_string(),
        building: "Main Library".to_string(),
        building_id: 12,
        building_code: "LIB".to_string(),
        room: "Room 101".to_string(),
        room_id: 345,
        room_code: "LIB-101".to_string(),
        room_type: "Seminar Room".to_string(),
        room_type_id: 7,
        group_name: "Graduate Studies".to_string(),
        reservation_id: 9000 + id,
        reservation_url: format!("/reservations/{}", 9000 + id),
        status_id: 1,
        status_type_id: -14,
        is_owner: false,
    }
}

pub fn engine(repository: SharedRepository) -> Arc<VersioningEngine> {
    Arc::new(VersioningEngine::new(
        repository,
        ConstantFieldExpectations::default(),
    ))
}

pub fn activity() -> Arc<ActivityLog> {
    Arc::new(ActivityLog::new(50))
}

// ============================================================================
// Scripted source
// ============================================================================

/// In-process [`EventSource`] serving canned listings per date
#[derive(Default)]
pub struct ScriptedSource {
    days: Mutex<HashMap<NaiveDate, Vec<Event>>>,
    failing: Mutex<HashSet<NaiveDate>>,
    calls: Mutex<Vec<NaiveDate>>,
    sessions: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `events` for `day` from now on
    pub fn set_day(&self, day: NaiveDate, events: Vec<Event>) {
        self.days.lock().unwrap().insert(day, events);
    }

    /// Make every fetch of `day` fail with a 503
    pub fn fail_day(&self, day: NaiveDate) {
        self.failing.lock().unwrap().insert(day);
    }

    /// Dates fetched so far, in order
    pub fn calls(&self) -> Vec<NaiveDate> {
        self.calls.lock().unwrap().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn ensure_session(&self) -> Result<()> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_day(&self, day: NaiveDate) -> Result<DayFetch> {
        self.calls.lock().unwrap().push(day);

        if self.failing.lock().unwrap().contains(&day) {
            return Err(Error::Fetch(FetchError::Status(503)));
        }

        let events = self
            .days
            .lock()
            .unwrap()
            .get(&day)
            .cloned()
            .unwrap_or_default();

        Ok(DayFetch {
            date: day,
            events,
            started: Instant::now(),
        })
    }
}
