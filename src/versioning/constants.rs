//! Expected values of fields the source is believed to never vary

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::fields::EventField;
use crate::models::Event;

/// One field holding something other than its expected constant
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantMismatch {
    pub field: EventField,
    pub expected: Value,
    pub actual: Value,
}

impl std::fmt::Display for ConstantMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} expected {} but found {}",
            self.field, self.expected, self.actual
        )
    }
}

/// Map of field → expected value
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantFieldExpectations {
    expected: BTreeMap<EventField, Value>,
}

impl Default for ConstantFieldExpectations {
    fn default() -> Self {
        let expected = BTreeMap::from([
            (EventField::TimezoneAbbreviation, json!("ET")),
            (EventField::StatusTypeId, json!(-14)),
            (EventField::IsOwner, json!(false)),
        ]);
        Self { expected }
    }
}

impl ConstantFieldExpectations {
    /// No expectations at all
    pub fn empty() -> Self {
        Self {
            expected: BTreeMap::new(),
        }
    }

    /// Build from configuration keyed by field name
    ///
    /// Returns the offending name when it is not a comparable field.
    pub fn from_map(map: &BTreeMap<String, Value>) -> Result<Self, String> {
        let expected = map
            .iter()
            .map(|(name, value)| {
                EventField::from_name(name)
                    .map(|field| (field, value.clone()))
                    .ok_or_else(|| name.clone())
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self { expected })
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }

    /// Fields of `event` that differ from their expected value
    pub fn check(&self, event: &Event) -> Vec<ConstantMismatch> {
        self.expected
            .iter()
            .filter_map(|(field, expected)| {
                let actual = field.value(event);
                (actual != *expected).then(|| ConstantMismatch {
                    field: *field,
                    expected: expected.clone(),
                    actual,
                })
            })
            .collect()
    }
}
