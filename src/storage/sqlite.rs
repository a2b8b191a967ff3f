//! SQLite implementation of the repository traits

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{CursorRepository, EventRepository};
use crate::models::{
    ConstantFieldViolation, Event, EventHistory, ScraperCursor, ScraperType, StoredEvent,
};
use crate::utils::error::{StorageError, StorageResult};
use crate::utils::{format_local, DATE_FORMAT, LOCAL_DATETIME_FORMAT};

/// Business columns shared by `events` and `event_history`, in bind order
const BUSINESS_COLUMNS: &str = "event_name, event_start, event_end, gmt_start, gmt_end, \
     booking_start, booking_end, is_all_day, timezone_abbreviation, building, building_id, \
     building_code, room, room_id, room_code, room_type, room_type_id, group_name, \
     reservation_id, reservation_url, status_id, status_type_id, is_owner";

const BUSINESS_COLUMN_COUNT: usize = 23;

/// Largest id list bound into a single `IN (...)` clause
const CHUNK_SIZE: usize = 500;

/// SQLite-backed repository
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path`
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied statement
        // behind, so a poisoned connection is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_schema(&self) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute_batch(&format!(
            r#"
                CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY,
                    event_name TEXT NOT NULL,
                    event_start TEXT NOT NULL,
                    event_end TEXT NOT NULL,
                    gmt_start TEXT NOT NULL,
                    gmt_end TEXT NOT NULL,
                    booking_start TEXT NOT NULL,
                    booking_end TEXT NOT NULL,
                    is_all_day INTEGER NOT NULL,
                    timezone_abbreviation TEXT NOT NULL,
                    building TEXT NOT NULL,
                    building_id INTEGER NOT NULL,
                    building_code TEXT NOT NULL,
                    room TEXT NOT NULL,
                    room_id INTEGER NOT NULL,
                    room_code TEXT NOT NULL,
                    room_type TEXT NOT NULL,
                    room_type_id INTEGER NOT NULL,
                    group_name TEXT NOT NULL,
                    reservation_id INTEGER NOT NULL,
                    reservation_url TEXT NOT NULL,
                    status_id INTEGER NOT NULL,
                    status_type_id INTEGER NOT NULL,
                    is_owner INTEGER NOT NULL,
                    version_number INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    last_checked TEXT NOT NULL,
                    no_longer_found_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_events_event_start
                    ON events(event_start);

                CREATE INDEX IF NOT EXISTS idx_events_no_longer_found
                    ON events(no_longer_found_at);

                CREATE TABLE IF NOT EXISTS event_history (
                    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_id INTEGER NOT NULL,
                    version_number INTEGER NOT NULL,
                    {BUSINESS_COLUMNS_DDL},
                    change_count INTEGER NOT NULL,
                    archived_at TEXT NOT NULL,
                    last_checked TEXT NOT NULL,
                    UNIQUE(event_id, version_number)
                );

                CREATE INDEX IF NOT EXISTS idx_event_history_event
                    ON event_history(event_id);

                CREATE TABLE IF NOT EXISTS scraper_cursors (
                    scraper_type TEXT PRIMARY KEY,
                    cursor_date TEXT NOT NULL,
                    enabled INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS constant_field_violations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_id INTEGER NOT NULL,
                    field_name TEXT NOT NULL,
                    expected_value TEXT NOT NULL,
                    actual_value TEXT NOT NULL,
                    detected_at TEXT NOT NULL
                );
                "#,
            BUSINESS_COLUMNS_DDL = history_business_ddl(),
        ))?;

        Ok(())
    }
}

/// Column definitions for the history copy of the business fields
fn history_business_ddl() -> String {
    const INTEGER_COLUMNS: [&str; 8] = [
        "is_all_day",
        "building_id",
        "room_id",
        "room_type_id",
        "reservation_id",
        "status_id",
        "status_type_id",
        "is_owner",
    ];

    BUSINESS_COLUMNS
        .split(',')
        .map(str::trim)
        .map(|column| {
            let kind = if INTEGER_COLUMNS.contains(&column) {
                "INTEGER"
            } else {
                "TEXT"
            };
            format!("{column} {kind} NOT NULL")
        })
        .collect::<Vec<_>>()
        .join(",\n                    ")
}

// ============================================================================
// Value conversion helpers
// ============================================================================

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn business_values(event: &Event) -> Vec<Value> {
    let values = vec![
        Value::Text(event.event_name.clone()),
        Value::Text(format_local(&event.event_start)),
        Value::Text(format_local(&event.event_end)),
        Value::Text(format_local(&event.gmt_start)),
        Value::Text(format_local(&event.gmt_end)),
        Value::Text(format_local(&event.booking_start)),
        Value::Text(format_local(&event.booking_end)),
        Value::Integer(i64::from(event.is_all_day)),
        Value::Text(event.timezone_abbreviation.clone()),
        Value::Text(event.building.clone()),
        Value::Integer(event.building_id),
        Value::Text(event.building_code.clone()),
        Value::Text(event.room.clone()),
        Value::Integer(event.room_id),
        Value::Text(event.room_code.clone()),
        Value::Text(event.room_type.clone()),
        Value::Integer(event.room_type_id),
        Value::Text(event.group_name.clone()),
        Value::Integer(event.reservation_id),
        Value::Text(event.reservation_url.clone()),
        Value::Integer(event.status_id),
        Value::Integer(event.status_type_id),
        Value::Integer(i64::from(event.is_owner)),
    ];
    debug_assert_eq!(values.len(), BUSINESS_COLUMN_COUNT);
    values
}

fn conversion_error(index: usize, column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(StorageError::Corrupt {
            column: column.to_string(),
            value: value.to_string(),
        }),
    )
}

fn local_at(row: &Row<'_>, index: usize, column: &str) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(index)?;
    NaiveDateTime::parse_from_str(&raw, LOCAL_DATETIME_FORMAT)
        .map_err(|_| conversion_error(index, column, &raw))
}

fn utc_at(row: &Row<'_>, index: usize, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| conversion_error(index, column, &raw))
}

fn optional_utc_at(
    row: &Row<'_>,
    index: usize,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(index)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| conversion_error(index, column, &raw)),
        None => Ok(None),
    }
}

/// Read the business columns starting at `offset`
fn event_from_row(row: &Row<'_>, id: i64, offset: usize) -> rusqlite::Result<Event> {
    Ok(Event {
        id,
        event_name: row.get(offset)?,
        event_start: local_at(row, offset + 1, "event_start")?,
        event_end: local_at(row, offset + 2, "event_end")?,
        gmt_start: local_at(row, offset + 3, "gmt_start")?,
        gmt_end: local_at(row, offset + 4, "gmt_end")?,
        booking_start: local_at(row, offset + 5, "booking_start")?,
        booking_end: local_at(row, offset + 6, "booking_end")?,
        is_all_day: row.get(offset + 7)?,
        timezone_abbreviation: row.get(offset + 8)?,
        building: row.get(offset + 9)?,
        building_id: row.get(offset + 10)?,
        building_code: row.get(offset + 11)?,
        room: row.get(offset + 12)?,
        room_id: row.get(offset + 13)?,
        room_code: row.get(offset + 14)?,
        room_type: row.get(offset + 15)?,
        room_type_id: row.get(offset + 16)?,
        group_name: row.get(offset + 17)?,
        reservation_id: row.get(offset + 18)?,
        reservation_url: row.get(offset + 19)?,
        status_id: row.get(offset + 20)?,
        status_type_id: row.get(offset + 21)?,
        is_owner: row.get(offset + 22)?,
    })
}

fn stored_event_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    let id: i64 = row.get(0)?;
    let meta = 1 + BUSINESS_COLUMN_COUNT;
    Ok(StoredEvent {
        event: event_from_row(row, id, 1)?,
        version_number: row.get(meta)?,
        created_at: utc_at(row, meta + 1, "created_at")?,
        updated_at: utc_at(row, meta + 2, "updated_at")?,
        last_checked: utc_at(row, meta + 3, "last_checked")?,
        no_longer_found_at: optional_utc_at(row, meta + 4, "no_longer_found_at")?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<EventHistory> {
    let sequence: i64 = row.get(0)?;
    let event_id: i64 = row.get(1)?;
    let meta = 3 + BUSINESS_COLUMN_COUNT;
    Ok(EventHistory {
        sequence: Some(sequence),
        version_number: row.get(2)?,
        event: event_from_row(row, event_id, 3)?,
        change_count: row.get(meta)?,
        archived_at: utc_at(row, meta + 1, "archived_at")?,
        last_checked: utc_at(row, meta + 2, "last_checked")?,
    })
}

fn cursor_from_row(row: &Row<'_>) -> rusqlite::Result<ScraperCursor> {
    let kind: String = row.get(0)?;
    let date: String = row.get(1)?;
    Ok(ScraperCursor {
        scraper_type: ScraperType::parse(&kind)
            .ok_or_else(|| conversion_error(0, "scraper_type", &kind))?,
        current_date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|_| conversion_error(1, "cursor_date", &date))?,
        enabled: row.get(2)?,
        updated_at: utc_at(row, 3, "updated_at")?,
    })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// Run an id-list statement chunk by chunk; `sql` contains one `{ids}` slot
/// and the leading parameters are bound before the ids.
fn execute_for_ids(
    conn: &Connection,
    sql: &str,
    leading: &[Value],
    ids: &[i64],
) -> StorageResult<usize> {
    let mut changed = 0;
    for chunk in ids.chunks(CHUNK_SIZE) {
        let statement = sql.replace("{ids}", &placeholders(chunk.len()));
        let params = leading
            .iter()
            .cloned()
            .chain(chunk.iter().map(|id| Value::Integer(*id)));
        changed += conn.execute(&statement, params_from_iter(params))?;
    }
    Ok(changed)
}

// ============================================================================
// EventRepository
// ============================================================================

impl EventRepository for SqliteRepository {
    fn find_event(&self, id: i64) -> StorageResult<Option<StoredEvent>> {
        let conn = self.lock();
        let stored = conn
            .query_row(
                &format!(
                    "SELECT id, {BUSINESS_COLUMNS}, version_number, created_at, updated_at, \
                     last_checked, no_longer_found_at FROM events WHERE id = ?1"
                ),
                params![id],
                stored_event_from_row,
            )
            .optional()?;

        Ok(stored)
    }

    fn insert_event(&self, event: &Event, now: DateTime<Utc>) -> StorageResult<()> {
        let conn = self.lock();
        let now = timestamp(&now);

        let mut values = vec![Value::Integer(event.id)];
        values.extend(business_values(event));
        values.extend([
            Value::Integer(1),
            Value::Text(now.clone()),
            Value::Text(now.clone()),
            Value::Text(now),
        ]);

        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO events (id, {BUSINESS_COLUMNS}, version_number, created_at, \
                 updated_at, last_checked) VALUES ({})",
                placeholders(values.len())
            ),
            params_from_iter(values),
        )?;
        if inserted == 0 {
            return Err(StorageError::DuplicateEvent(event.id));
        }

        Ok(())
    }

    fn archive_and_update(
        &self,
        history: &EventHistory,
        fresh: &Event,
        now: DateTime<Utc>,
    ) -> StorageResult<u32> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let current: Option<u32> = tx
            .query_row(
                "SELECT version_number FROM events WHERE id = ?1",
                params![fresh.id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(StorageError::EventNotFound(fresh.id));
        };

        let mut archived = vec![
            Value::Integer(history.event.id),
            Value::Integer(i64::from(history.version_number)),
        ];
        archived.extend(business_values(&history.event));
        archived.extend([
            Value::Integer(i64::from(history.change_count)),
            Value::Text(timestamp(&history.archived_at)),
            Value::Text(timestamp(&history.last_checked)),
        ]);
        tx.execute(
            &format!(
                "INSERT INTO event_history (event_id, version_number, {BUSINESS_COLUMNS}, \
                 change_count, archived_at, last_checked) VALUES ({})",
                placeholders(archived.len())
            ),
            params_from_iter(archived),
        )?;

        let assignments = BUSINESS_COLUMNS
            .split(',')
            .map(|column| format!("{} = ?", column.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let now = timestamp(&now);
        let mut values = business_values(fresh);
        values.extend([
            Value::Text(now.clone()),
            Value::Text(now),
            Value::Integer(fresh.id),
        ]);
        tx.execute(
            &format!(
                "UPDATE events SET {assignments}, version_number = version_number + 1, \
                 updated_at = ?, last_checked = ? WHERE id = ?"
            ),
            params_from_iter(values),
        )?;

        tx.commit()?;
        Ok(current + 1)
    }

    fn history(&self, id: i64) -> StorageResult<Vec<EventHistory>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT sequence, event_id, version_number, {BUSINESS_COLUMNS}, change_count, \
             archived_at, last_checked FROM event_history WHERE event_id = ?1 \
             ORDER BY version_number, sequence"
        ))?;

        let history = stmt
            .query_map(params![id], history_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(history)
    }

    fn ids_scheduled_on(&self, date: NaiveDate) -> StorageResult<HashSet<i64>> {
        let conn = self.lock();
        let start = date.format(DATE_FORMAT).to_string();
        let end = date
            .succ_opt()
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "9999-99-99".to_string());

        let mut stmt =
            conn.prepare("SELECT id FROM events WHERE event_start >= ?1 AND event_start < ?2")?;
        let ids = stmt
            .query_map(params![start, end], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;

        Ok(ids)
    }

    fn ids_marked_absent(&self, ids: &[i64]) -> StorageResult<HashSet<i64>> {
        let conn = self.lock();
        let mut absent = HashSet::new();

        for chunk in ids.chunks(CHUNK_SIZE) {
            let mut stmt = conn.prepare(&format!(
                "SELECT id FROM events WHERE no_longer_found_at IS NOT NULL AND id IN ({})",
                placeholders(chunk.len())
            ))?;
            let found = stmt
                .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            absent.extend(found);
        }

        Ok(absent)
    }

    fn mark_no_longer_found(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.lock();
        execute_for_ids(
            &conn,
            "UPDATE events SET no_longer_found_at = ? \
             WHERE no_longer_found_at IS NULL AND id IN ({ids})",
            &[Value::Text(timestamp(&now))],
            ids,
        )
    }

    fn clear_no_longer_found(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.lock();
        execute_for_ids(
            &conn,
            "UPDATE events SET no_longer_found_at = NULL, last_checked = ? WHERE id IN ({ids})",
            &[Value::Text(timestamp(&now))],
            ids,
        )
    }

    fn touch_last_checked(&self, ids: &[i64], now: DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.lock();
        execute_for_ids(
            &conn,
            "UPDATE events SET last_checked = ? WHERE id IN ({ids})",
            &[Value::Text(timestamp(&now))],
            ids,
        )
    }

    fn record_violation(&self, violation: &ConstantFieldViolation) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO constant_field_violations \
             (event_id, field_name, expected_value, actual_value, detected_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                violation.event_id,
                violation.field_name,
                violation.expected_value,
                violation.actual_value,
                timestamp(&violation.detected_at)
            ],
        )?;
        Ok(())
    }

    fn violations(&self, limit: usize) -> StorageResult<Vec<ConstantFieldViolation>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT event_id, field_name, expected_value, actual_value, detected_at \
             FROM constant_field_violations ORDER BY detected_at DESC, id DESC LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let violations = stmt
            .query_map(params![limit], |row| {
                Ok(ConstantFieldViolation {
                    event_id: row.get(0)?,
                    field_name: row.get(1)?,
                    expected_value: row.get(2)?,
                    actual_value: row.get(3)?,
                    detected_at: utc_at(row, 4, "detected_at")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(violations)
    }

    fn event_count(&self) -> StorageResult<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

// ============================================================================
// CursorRepository
// ============================================================================

impl CursorRepository for SqliteRepository {
    fn load_cursor(&self, scraper_type: ScraperType) -> StorageResult<Option<ScraperCursor>> {
        let conn = self.lock();
        let cursor = conn
            .query_row(
                "SELECT scraper_type, cursor_date, enabled, updated_at \
                 FROM scraper_cursors WHERE scraper_type = ?1",
                params![scraper_type.as_str()],
                cursor_from_row,
            )
            .optional()?;

        Ok(cursor)
    }

    fn save_cursor(&self, cursor: &ScraperCursor) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            r#"
                INSERT INTO scraper_cursors (scraper_type, cursor_date, enabled, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(scraper_type) DO UPDATE SET
                    cursor_date = excluded.cursor_date,
                    enabled = excluded.enabled,
                    updated_at = excluded.updated_at
                "#,
            params![
                cursor.scraper_type.as_str(),
                cursor.current_date.format(DATE_FORMAT).to_string(),
                cursor.enabled,
                timestamp(&cursor.updated_at)
            ],
        )?;

        Ok(())
    }

    fn list_cursors(&self) -> StorageResult<Vec<ScraperCursor>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT scraper_type, cursor_date, enabled, updated_at \
             FROM scraper_cursors ORDER BY scraper_type",
        )?;

        let cursors = stmt
            .query_map([], cursor_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(cursors)
    }
}
