//! Semantic equality and field diffs between current and desired state

use crate::descriptor::ResourceDescriptor;
use crate::schema::{NormalizedItem, REDACTED, render_value};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Per-field comparison rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Compare {
    pub case_insensitive: bool,
    /// Lists compare element by element instead of as sets
    pub ordered: bool,
}

impl Compare {
    pub fn for_field(descriptor: &ResourceDescriptor, field: &str) -> Self {
        Self {
            case_insensitive: descriptor.case_insensitive.contains(field),
            ordered: descriptor.ordered.contains(field),
        }
    }
}

/// Check if `current` already satisfies `desired`.
///
/// - numbers compare by value (`1.0 == 1`)
/// - strings honor `case_insensitive`
/// - lists are sets unless `ordered`: duplicates and order are ignored
/// - objects compare as a subset: keys absent from `desired` are kept,
///   keys explicitly null in `desired` must be unset or null in `current`
pub fn values_equal(current: &Value, desired: &Value, cmp: Compare) -> bool {
    match (current, desired) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::String(a), Value::String(b)) if cmp.case_insensitive => {
            a.to_lowercase() == b.to_lowercase()
        }
        (Value::Array(a), Value::Array(b)) if cmp.ordered => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y, cmp))
        }
        (Value::Array(a), Value::Array(b)) => {
            b.iter().all(|want| a.iter().any(|have| values_equal(have, want, cmp)))
                && a.iter().all(|have| b.iter().any(|want| values_equal(have, want, cmp)))
        }
        (Value::Object(a), Value::Object(b)) => b.iter().all(|(key, want)| match a.get(key) {
            None => want.is_null(),
            Some(have) => {
                (have.is_null() && want.is_null()) || values_equal(have, want, cmp)
            }
        }),
        _ => current == desired,
    }
}

/// One differing field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    /// `None` when the field is unset on the controller
    pub current: Option<Value>,
    pub desired: Value,
    pub sensitive: bool,
}

impl FieldChange {
    fn side(&self, value: Option<&Value>) -> String {
        match value {
            None => "(unset)".to_string(),
            Some(_) if self.sensitive => REDACTED.to_string(),
            Some(Value::Null) => "null".to_string(),
            Some(v) => render_value(v),
        }
    }

    /// Current value as shown to the user.
    pub fn current_text(&self) -> String {
        self.side(self.current.as_ref())
    }

    /// Desired value as shown to the user.
    pub fn desired_text(&self) -> String {
        self.side(Some(&self.desired))
    }

    fn redacted(&self, value: Option<&Value>) -> Value {
        match value {
            None => Value::Null,
            Some(_) if self.sensitive => Value::String(REDACTED.to_string()),
            Some(v) => v.clone(),
        }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} → {}",
            self.field,
            self.current_text(),
            self.desired_text()
        )
    }
}

impl Serialize for FieldChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("FieldChange", 3)?;
        s.serialize_field("field", &self.field)?;
        s.serialize_field("current", &self.redacted(self.current.as_ref()))?;
        s.serialize_field("desired", &self.redacted(Some(&self.desired)))?;
        s.end()
    }
}

/// Field-by-field delta over the comparable fields.
///
/// Skips write-only fields, fields absent from the desired item, and fields
/// whose desired value is only a default.
pub fn diff(
    descriptor: &ResourceDescriptor,
    current: &Map<String, Value>,
    desired: &NormalizedItem,
) -> Vec<FieldChange> {
    descriptor
        .comparable
        .iter()
        .filter(|field| !descriptor.write_only.contains(*field))
        .filter(|field| desired.is_explicit(field))
        .filter_map(|field| {
            let want = desired.values.get(field)?;
            let have = current.get(field);
            let same = match have {
                None | Some(Value::Null) => want.is_null(),
                Some(have) => values_equal(have, want, Compare::for_field(descriptor, field)),
            };
            (!same).then(|| FieldChange {
                field: field.clone(),
                current: have.cloned(),
                desired: want.clone(),
                sensitive: descriptor.schema.is_sensitive(field),
            })
        })
        .collect()
}

/// Check if the current object already matches the desired item.
pub fn equal(
    descriptor: &ResourceDescriptor,
    current: &Map<String, Value>,
    desired: &NormalizedItem,
) -> bool {
    diff(descriptor, current, desired).is_empty()
}
