//! Comparable field schema
//!
//! The one list of business fields that change detection, constant-field
//! checks, and any display of diffs work from. Identity (`id`) and versioning
//! metadata are not part of it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Event;
use crate::utils::format_local;

/// A comparable business field of [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventField {
    EventName,
    EventStart,
    EventEnd,
    GmtStart,
    GmtEnd,
    BookingStart,
    BookingEnd,
    IsAllDay,
    TimezoneAbbreviation,
    Building,
    BuildingId,
    BuildingCode,
    Room,
    RoomId,
    RoomCode,
    RoomType,
    RoomTypeId,
    GroupName,
    ReservationId,
    ReservationUrl,
    StatusId,
    StatusTypeId,
    IsOwner,
}

impl EventField {
    /// Every comparable field, in storage column order
    pub const ALL: [EventField; 23] = [
        Self::EventName,
        Self::EventStart,
        Self::EventEnd,
        Self::GmtStart,
        Self::GmtEnd,
        Self::BookingStart,
        Self::BookingEnd,
        Self::IsAllDay,
        Self::TimezoneAbbreviation,
        Self::Building,
        Self::BuildingId,
        Self::BuildingCode,
        Self::Room,
        Self::RoomId,
        Self::RoomCode,
        Self::RoomType,
        Self::RoomTypeId,
        Self::GroupName,
        Self::ReservationId,
        Self::ReservationUrl,
        Self::StatusId,
        Self::StatusTypeId,
        Self::IsOwner,
    ];

    /// Column / field name
    pub fn name(&self) -> &'static str {
        match self {
            Self::EventName => "event_name",
            Self::EventStart => "event_start",
            Self::EventEnd => "event_end",
            Self::GmtStart => "gmt_start",
            Self::GmtEnd => "gmt_end",
            Self::BookingStart => "booking_start",
            Self::BookingEnd => "booking_end",
            Self::IsAllDay => "is_all_day",
            Self::TimezoneAbbreviation => "timezone_abbreviation",
            Self::Building => "building",
            Self::BuildingId => "building_id",
            Self::BuildingCode => "building_code",
            Self::Room => "room",
            Self::RoomId => "room_id",
            Self::RoomCode => "room_code",
            Self::RoomType => "room_type",
            Self::RoomTypeId => "room_type_id",
            Self::GroupName => "group_name",
            Self::ReservationId => "reservation_id",
            Self::ReservationUrl => "reservation_url",
            Self::StatusId => "status_id",
            Self::StatusTypeId => "status_type_id",
            Self::IsOwner => "is_owner",
        }
    }

    /// Look a field up by its name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Current value of this field on `event`, as JSON
    pub fn value(&self, event: &Event) -> Value {
        match self {
            Self::EventName => json!(event.event_name),
            Self::EventStart => json!(format_local(&event.event_start)),
            Self::EventEnd => json!(format_local(&event.event_end)),
            Self::GmtStart => json!(format_local(&event.gmt_start)),
            Self::GmtEnd => json!(format_local(&event.gmt_end)),
            Self::BookingStart => json!(format_local(&event.booking_start)),
            Self::BookingEnd => json!(format_local(&event.booking_end)),
            Self::IsAllDay => json!(event.is_all_day),
            Self::TimezoneAbbreviation => json!(event.timezone_abbreviation),
            Self::Building => json!(event.building),
            Self::BuildingId => json!(event.building_id),
            Self::BuildingCode => json!(event.building_code),
            Self::Room => json!(event.room),
            Self::RoomId => json!(event.room_id),
            Self::RoomCode => json!(event.room_code),
            Self::RoomType => json!(event.room_type),
            Self::RoomTypeId => json!(event.room_type_id),
            Self::GroupName => json!(event.group_name),
            Self::ReservationId => json!(event.reservation_id),
            Self::ReservationUrl => json!(event.reservation_url),
            Self::StatusId => json!(event.status_id),
            Self::StatusTypeId => json!(event.status_type_id),
            Self::IsOwner => json!(event.is_owner),
        }
    }
}

impl std::fmt::Display for EventField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One field that differs between the stored and the fresh event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: EventField,
    pub old_value: Value,
    pub new_value: Value,
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.old_value, self.new_value)
    }
}

/// Compare `fresh` against `stored` over [`EventField::ALL`]
///
/// Returns `None` when nothing differs.
pub fn detect_changes(fresh: &Event, stored: &Event) -> Option<Vec<FieldChange>> {
    let changes: Vec<FieldChange> = EventField::ALL
        .iter()
        .filter_map(|field| {
            let old_value = field.value(stored);
            let new_value = field.value(fresh);
            (old_value != new_value).then_some(FieldChange {
                field: *field,
                old_value,
                new_value,
            })
        })
        .collect();

    if changes.is_empty() {
        None
    } else {
        Some(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::tests::sample_event;

    #[test]
    fn test_names_are_unique_and_resolvable() {
        let mut names: Vec<&str> = EventField::ALL.iter().map(|f| f.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventField::ALL.len());

        for field in EventField::ALL {
            assert_eq!(EventField::from_name(field.name()), Some(field));
        }
        assert_eq!(EventField::from_name("id"), None);
        assert_eq!(EventField::from_name("version_number"), None);
    }

    #[test]
    fn test_identical_events_have_no_changes() {
        let event = sample_event(500, "Seminar A");
        assert!(detect_changes(&event, &event.clone()).is_none());
    }

    #[test]
    fn test_detects_name_change() {
        let stored = sample_event(500, "Seminar A");
        let fresh = sample_event(500, "Seminar B");

        let changes = detect_changes(&fresh, &stored).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, EventField::EventName);
        assert_eq!(changes[0].old_value, json!("Seminar A"));
        assert_eq!(changes[0].new_value, json!("Seminar B"));
    }

    #[test]
    fn test_detects_multiple_changes_in_schema_order() {
        let stored = sample_event(7, "Board Meeting");
        let mut fresh = stored.clone();
        fresh.room = "Hall 2".into();
        fresh.is_all_day = true;
        fresh.event_end += chrono::Duration::minutes(30);

        let changes = detect_changes(&fresh, &stored).unwrap();
        let fields: Vec<EventField> = changes.iter().map(|c| c.field).collect();
        assert_eq!(
            fields,
            vec![EventField::EventEnd, EventField::IsAllDay, EventField::Room]
        );
    }

    #[test]
    fn test_identity_is_not_compared() {
        let stored = sample_event(1, "Lecture");
        let mut fresh = stored.clone();
        fresh.id = 2;
        assert!(detect_changes(&fresh, &stored).is_none());
    }

    #[test]
    fn test_field_change_display() {
        let change = FieldChange {
            field: EventField::Room,
            old_value: json!("A"),
            new_value: json!("B"),
        };
        assert_eq!(change.to_string(), "room: \"A\" -> \"B\"");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_diff_reports_exactly_the_edited_fields(
                name in "[A-Za-z ]{0,24}",
                room_id in any::<i64>(),
                status_type_id in -20i64..20,
                all_day in any::<bool>(),
            ) {
                let stored = sample_event(9, "Baseline");
                let mut fresh = stored.clone();
                fresh.event_name = name.clone();
                fresh.room_id = room_id;
                fresh.status_type_id = status_type_id;
                fresh.is_all_day = all_day;

                // Pushed in EventField::ALL order
                let mut expected = Vec::new();
                if name != stored.event_name {
                    expected.push(EventField::EventName);
                }
                if all_day != stored.is_all_day {
                    expected.push(EventField::IsAllDay);
                }
                if room_id != stored.room_id {
                    expected.push(EventField::RoomId);
                }
                if status_type_id != stored.status_type_id {
                    expected.push(EventField::StatusTypeId);
                }

                let reported: Vec<EventField> = detect_changes(&fresh, &stored)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| c.field)
                    .collect();
                prop_assert_eq!(reported, expected);
            }

            #[test]
            fn prop_diff_is_symmetric_in_fields(name in "[a-z]{1,12}") {
                let a = sample_event(1, "fixed");
                let b = sample_event(1, &name);
                let forward: Vec<EventField> = detect_changes(&a, &b)
                    .unwrap_or_default()
                    .iter()
                    .map(|c| c.field)
                    .collect();
                let backward: Vec<EventField> = detect_changes(&b, &a)
                    .unwrap_or_default()
                    .iter()
                    .map(|c| c.field)
                    .collect();
                prop_assert_eq!(forward, backward);
            }
        }
    }
}
