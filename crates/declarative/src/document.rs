//! Whole-document validation
//!
//! A desired-state document is a list of items, each selecting its resource
//! kind with a `kind` field. Every item is checked against its kind's schema
//! and every violation in the document is collected before anything is
//! returned, so a user sees the full list in one run.

use crate::descriptor::{Identity, Registry};
use crate::schema::{FieldType, NormalizedItem, Violation, ViolationKind, json_type};
use crate::types::State;
use serde_json::Value;
use std::collections::BTreeMap;

/// Field selecting an item's resource kind
pub const KIND_FIELD: &str = "kind";

/// Root path used in violation paths
const ROOT: &str = "config";

/// Validate a document and normalize its items.
///
/// Returns the items in declaration order with defaults applied, or every
/// violation found.
pub fn validate_document(
    registry: &Registry,
    config: &Value,
    state: State,
) -> Result<Vec<NormalizedItem>, Vec<Violation>> {
    let Some(entries) = config.as_array() else {
        return Err(vec![Violation::new(
            ROOT,
            ViolationKind::WrongType {
                expected: FieldType::List,
                found: json_type(config),
            },
        )]);
    };

    let mut violations = Vec::new();
    let mut items = Vec::with_capacity(entries.len());
    let mut seen: BTreeMap<Identity, usize> = BTreeMap::new();

    for (index, entry) in entries.iter().enumerate() {
        let path = format!("{ROOT}[{index}]");
        let Some(map) = entry.as_object() else {
            violations.push(Violation::new(path, ViolationKind::NotAnObject));
            continue;
        };

        let kind_path = format!("{path}.{KIND_FIELD}");
        let kind = match map.get(KIND_FIELD) {
            None => {
                violations.push(Violation::new(path, ViolationKind::MissingKind));
                continue;
            }
            Some(Value::String(kind)) => kind,
            Some(other) => {
                violations.push(Violation::new(
                    kind_path,
                    ViolationKind::WrongType {
                        expected: FieldType::Str,
                        found: json_type(other),
                    },
                ));
                continue;
            }
        };
        let Some(descriptor) = registry.get(kind) else {
            violations.push(Violation::new(
                kind_path,
                ViolationKind::UnknownKind { kind: kind.clone() },
            ));
            continue;
        };

        let mut values = map.clone();
        values.remove(KIND_FIELD);

        let before = violations.len();
        violations.extend(descriptor.schema.validate(&Value::Object(values.clone()), &path));
        if state == State::Replaced && descriptor.list.is_none() {
            violations.push(Violation::new(
                &path,
                ViolationKind::Unsupported {
                    reason: format!("kind '{kind}' cannot be listed, so state 'replaced' is not available"),
                },
            ));
        }
        if violations.len() > before {
            continue;
        }

        descriptor.schema.normalize_ints(&mut values);
        let defaulted = descriptor.schema.apply_defaults(&mut values);
        let Some(identity) = descriptor.item_identity(&values) else {
            let missing = descriptor
                .identity
                .iter()
                .find(|f| values.get(*f).is_none_or(Value::is_null))
                .map_or_else(|| path.clone(), |f| format!("{path}.{f}"));
            violations.push(Violation::new(missing, ViolationKind::Missing));
            continue;
        };

        if let Some(&first) = seen.get(&identity) {
            violations.push(Violation::new(
                path,
                ViolationKind::DuplicateIdentity {
                    identity: identity.to_string(),
                    first,
                },
            ));
            continue;
        }
        seen.insert(identity, index);

        items.push(NormalizedItem {
            kind: kind.clone(),
            index,
            values,
            defaulted,
        });
    }

    if violations.is_empty() {
        Ok(items)
    } else {
        Err(violations)
    }
}
