//! Day fetcher for the reservation system's bulk bookings endpoint
//!
//! One POST per calendar date. The endpoint answers with an envelope of the
//! form `{"d": "<json string>"}`; the inner string decodes to
//! `{"DailyBookingResults": [...]}`. The listing may spill into neighbouring
//! dates, so callers only ever see events whose local start falls on the
//! requested date.

use chrono::{NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use url::Url;

use super::headers::build_api_headers;
use crate::models::Event;
use crate::utils::error::FetchError;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

/// Pick a user agent from the built-in pool
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}

// ============================================================================
// Wire types
// ============================================================================

/// Request body of the bulk query
#[derive(Debug, Serialize)]
struct BookingsQuery {
    date: String,
    data: BookingFilters,
}

/// Every filter at -1 means "no filter"
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BookingFilters {
    building_id: i64,
    group_type_id: i64,
    group_id: i64,
    event_type_id: i64,
    room_id: i64,
    status_id: i64,
}

impl Default for BookingFilters {
    fn default() -> Self {
        Self {
            building_id: -1,
            group_type_id: -1,
            group_id: -1,
            event_type_id: -1,
            room_id: -1,
            status_id: -1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    d: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBookings {
    #[serde(rename = "DailyBookingResults", default)]
    results: Vec<RawBooking>,
}

/// Treat an explicit `null` like a missing value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One booking as published by the source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawBooking {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_name: String,
    pub event_start: NaiveDateTime,
    pub event_end: NaiveDateTime,
    pub gmt_start: NaiveDateTime,
    pub gmt_end: NaiveDateTime,
    pub time_booking_start: NaiveDateTime,
    pub time_booking_end: NaiveDateTime,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_all_day_event: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timezone_abbreviation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub building: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub building_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub building_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub room: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub room_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub room_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub room_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub room_type_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reservation_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reservation_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_type_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_event_owner: bool,
}

impl From<RawBooking> for Event {
    fn from(raw: RawBooking) -> Self {
        Self {
            id: raw.id,
            event_name: raw.event_name,
            event_start: raw.event_start,
            event_end: raw.event_end,
            gmt_start: raw.gmt_start,
            gmt_end: raw.gmt_end,
            booking_start: raw.time_booking_start,
            booking_end: raw.time_booking_end,
            is_all_day: raw.is_all_day_event,
            timezone_abbreviation: raw.timezone_abbreviation,
            building: raw.building,
            building_id: raw.building_id,
            building_code: raw.building_code,
            room: raw.room,
            room_id: raw.room_id,
            room_code: raw.room_code,
            room_type: raw.room_type,
            room_type_id: raw.room_type_id,
            group_name: raw.group_name,
            reservation_id: raw.reservation_id,
            reservation_url: raw.reservation_url,
            status_id: raw.status_id,
            status_type_id: raw.status_type_id,
            is_owner: raw.is_event_owner,
        }
    }
}

/// Decode a response body and keep the events starting on `date`
///
/// Source order is preserved.
pub fn parse_envelope(body: &str, date: NaiveDate) -> Result<Vec<Event>, FetchError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| FetchError::Envelope(format!("outer envelope: {e}")))?;
    let payload = envelope
        .d
        .ok_or_else(|| FetchError::Envelope("missing \"d\" payload".to_string()))?;

    let bookings: DailyBookings = serde_json::from_str(&payload)?;

    Ok(bookings
        .results
        .into_iter()
        .map(Event::from)
        .filter(|event| event.scheduled_date() == date)
        .collect())
}

// ============================================================================
// DayFetcher
// ============================================================================

/// Issues the bulk query for one date
pub struct DayFetcher {
    client: Client,
    bookings_url: Url,
    origin: String,
    referer: String,
    token_header: String,
    user_agent: Option<String>,
}

impl DayFetcher {
    /// # Arguments
    ///
    /// * `bookings_url` - Bulk query endpoint
    /// * `referer` - Page the query is issued from (the session page)
    /// * `token_header` - Header carrying the anti-forgery token
    /// * `user_agent` - Fixed user agent; `None` rotates through the built-in pool
    pub fn new(
        client: Client,
        bookings_url: Url,
        referer: &Url,
        token_header: impl Into<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            client,
            origin: bookings_url.origin().ascii_serialization(),
            bookings_url,
            referer: referer.to_string(),
            token_header: token_header.into(),
            user_agent,
        }
    }

    pub fn bookings_url(&self) -> &Url {
        &self.bookings_url
    }

    /// Fetch the events scheduled on `date`
    ///
    /// # Errors
    ///
    /// `FetchError::Status` for non-success responses (401/403 mean the
    /// token was rejected), `Envelope`/`Json` for undecodable bodies.
    pub async fn fetch(&self, date: NaiveDate, token: &str) -> Result<Vec<Event>, FetchError> {
        let user_agent = self
            .user_agent
            .as_deref()
            .unwrap_or_else(|| random_user_agent());
        let headers = build_api_headers(
            user_agent,
            &self.origin,
            &self.referer,
            &self.token_header,
            token,
        )?;

        let query = BookingsQuery {
            date: format!("{} 00:00:00", date.format("%Y-%m-%d")),
            data: BookingFilters::default(),
        };

        let response = self
            .client
            .post(self.bookings_url.clone())
            .headers(headers)
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let events = parse_envelope(&body, date)?;

        debug!(date = %date, events = events.len(), "Fetched day listing");
        Ok(events)
    }
}
