//! Schema validation for desired-state items
//!
//! A [`Schema`] checks one item and reports every problem it finds as a
//! [`Violation`]. Nothing is coerced: `"5"` for an int field is a violation.
//! Defaults are applied only after an item validates cleanly, and the
//! defaulted field names are kept so that an absent field can still be told
//! apart from one explicitly set to its default.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Rendering of sensitive values in every diagnostic
pub const REDACTED: &str = "********";

/// Value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Any,
}

impl FieldType {
    /// Check if a JSON value has this type, without coercion.
    ///
    /// Integral floats (`1.0`) count as ints; strings never count as numbers.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => {
                value.is_i64()
                    || value.is_u64()
                    || value
                        .as_f64()
                        .is_some_and(|f| f.is_finite() && f.fract() == 0.0)
            }
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
            Self::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Declaration of one field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    /// Allowed values (for lists, allowed elements)
    pub choices: Vec<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Bounds on string length in chars, or list length
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Never printed, logged or echoed
    pub sensitive: bool,
    /// Element type of a list
    pub elements: Option<FieldType>,
    /// Nested schema for a dict, or for the dict elements of a list
    pub options: Option<Box<Schema>>,
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
            choices: Vec::new(),
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            sensitive: false,
            elements: None,
            options: None,
            description: None,
        }
    }

    pub fn str(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Str)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    /// A list whose elements have type `elements`.
    pub fn list(name: impl Into<String>, elements: FieldType) -> Self {
        let mut spec = Self::new(name, FieldType::List);
        spec.elements = Some(elements);
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn options(mut self, schema: Schema) -> Self {
        self.options = Some(Box::new(schema));
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    fn render(&self, value: &Value) -> String {
        if self.sensitive {
            REDACTED.to_string()
        } else {
            render_value(value)
        }
    }

    fn normalize_ints(&self, value: &mut Value) {
        match value {
            Value::Number(_) if self.ty == FieldType::Int => integral(value),
            Value::Array(items) => {
                for item in items {
                    if self.elements == Some(FieldType::Int) {
                        integral(item);
                    }
                    if let (Some(schema), Value::Object(map)) = (&self.options, item) {
                        schema.normalize_ints(map);
                    }
                }
            }
            Value::Object(map) => {
                if let Some(schema) = &self.options {
                    schema.normalize_ints(map);
                }
            }
            _ => {}
        }
    }

    fn check(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        if !self.ty.accepts(value) {
            out.push(Violation::new(
                path,
                ViolationKind::WrongType {
                    expected: self.ty,
                    found: json_type(value),
                },
            ));
            return;
        }

        match value {
            Value::String(s) => {
                self.check_length(s.chars().count(), path, out);
                self.check_choice(value, path, out);
            }
            Value::Number(n) => {
                let f = n.as_f64().unwrap_or_default();
                let below = self.min.is_some_and(|min| f < min);
                let above = self.max.is_some_and(|max| f > max);
                if below || above {
                    out.push(Violation::new(
                        path,
                        ViolationKind::OutOfRange {
                            value: self.render(value),
                            min: self.min,
                            max: self.max,
                        },
                    ));
                }
                self.check_choice(value, path, out);
            }
            Value::Bool(_) => self.check_choice(value, path, out),
            Value::Array(items) => {
                self.check_length(items.len(), path, out);
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    if let Some(ty) = self.elements
                        && !ty.accepts(item)
                    {
                        out.push(Violation::new(
                            &item_path,
                            ViolationKind::WrongType {
                                expected: ty,
                                found: json_type(item),
                            },
                        ));
                        continue;
                    }
                    self.check_choice(item, &item_path, out);
                    if let (Some(schema), Value::Object(_)) = (&self.options, item) {
                        schema.check(item, &item_path, out);
                    }
                }
            }
            Value::Object(_) => {
                if let Some(schema) = &self.options {
                    schema.check(value, path, out);
                }
            }
            Value::Null => {}
        }
    }

    fn check_length(&self, len: usize, path: &str, out: &mut Vec<Violation>) {
        let short = self.min_length.is_some_and(|min| len < min);
        let long = self.max_length.is_some_and(|max| len > max);
        if short || long {
            out.push(Violation::new(
                path,
                ViolationKind::BadLength {
                    len,
                    min: self.min_length,
                    max: self.max_length,
                },
            ));
        }
    }

    fn check_choice(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        if self.choices.is_empty() || self.choices.iter().any(|c| choice_matches(c, value)) {
            return;
        }
        let choices = if self.sensitive {
            Vec::new()
        } else {
            self.choices.iter().map(render_value).collect()
        };
        out.push(Violation::new(
            path,
            ViolationKind::NotAChoice {
                value: self.render(value),
                choices,
            },
        ));
    }
}

fn choice_matches(choice: &Value, value: &Value) -> bool {
    match (choice.as_f64(), value.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => choice == value,
    }
}

/// Render a value for diagnostics: strings bare, everything else as JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Declared shape of one item kind
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
    /// Groups of which at least one field must be present
    pub required_one_of: Vec<Vec<String>>,
    /// Groups of which at most one field may be present
    pub mutually_exclusive: Vec<Vec<String>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn required_one_of(mut self, group: &[&str]) -> Self {
        self.required_one_of
            .push(group.iter().map(ToString::to_string).collect());
        self
    }

    pub fn mutually_exclusive(mut self, group: &[&str]) -> Self {
        self.mutually_exclusive
            .push(group.iter().map(ToString::to_string).collect());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.get(name).is_some_and(|f| f.sensitive)
    }

    /// Validate one item, returning every violation found.
    pub fn validate(&self, value: &Value, path: &str) -> Vec<Violation> {
        let mut out = Vec::new();
        self.check(value, path, &mut out);
        out
    }

    fn check(&self, value: &Value, path: &str, out: &mut Vec<Violation>) {
        let Some(map) = value.as_object() else {
            out.push(Violation::new(path, ViolationKind::NotAnObject));
            return;
        };

        for key in map.keys() {
            if !self.contains(key) {
                out.push(Violation::new(join(path, key), ViolationKind::UnknownField));
            }
        }

        for field in &self.fields {
            let field_path = join(path, &field.name);
            match map.get(&field.name) {
                None if field.required => {
                    out.push(Violation::new(field_path, ViolationKind::Missing));
                }
                None => {}
                Some(Value::Null) if field.required => {
                    out.push(Violation::new(field_path, ViolationKind::NullNotAllowed));
                }
                // explicit null on an optional field means "clear"
                Some(Value::Null) => {}
                Some(v) => field.check(v, &field_path, out),
            }
        }

        let present = |name: &String| map.get(name).is_some_and(|v| !v.is_null());
        for group in &self.required_one_of {
            if !group.iter().any(present) {
                out.push(Violation::new(
                    path,
                    ViolationKind::RequiredOneOf {
                        fields: group.clone(),
                    },
                ));
            }
        }
        for group in &self.mutually_exclusive {
            if group.iter().filter(|f| present(f)).count() > 1 {
                out.push(Violation::new(
                    path,
                    ViolationKind::MutuallyExclusive {
                        fields: group.clone(),
                    },
                ));
            }
        }
    }

    /// Rewrite integral floats (`5.0`) in int fields as integers.
    pub fn normalize_ints(&self, map: &mut Map<String, Value>) {
        for field in &self.fields {
            if let Some(value) = map.get_mut(&field.name) {
                field.normalize_ints(value);
            }
        }
    }

    /// Fill absent top-level fields from their defaults.
    ///
    /// Returns the names of the fields that were filled.
    pub fn apply_defaults(&self, map: &mut Map<String, Value>) -> BTreeSet<String> {
        let mut defaulted = BTreeSet::new();
        for field in &self.fields {
            if let Some(default) = &field.default
                && !map.contains_key(&field.name)
            {
                map.insert(field.name.clone(), default.clone());
                defaulted.insert(field.name.clone());
            }
        }
        defaulted
    }
}

fn integral(value: &mut Value) {
    if value.is_f64()
        && let Some(f) = value.as_f64()
        && f.is_finite()
        && f.fract() == 0.0
    {
        *value = Value::from(f as i64);
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// One validated and defaulted desired-state item
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub kind: String,
    /// Position in the document
    pub index: usize,
    /// Field values, `kind` removed, defaults applied
    pub values: Map<String, Value>,
    /// Fields whose value came from a default
    pub defaulted: BTreeSet<String>,
}

impl NormalizedItem {
    /// Check if a field was given explicitly (possibly as null)
    pub fn is_explicit(&self, field: &str) -> bool {
        self.values.contains_key(field) && !self.defaulted.contains(field)
    }
}

/// What is wrong at one path
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    Missing,
    NullNotAllowed,
    WrongType {
        expected: FieldType,
        found: &'static str,
    },
    NotAChoice {
        value: String,
        choices: Vec<String>,
    },
    OutOfRange {
        value: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    BadLength {
        len: usize,
        min: Option<usize>,
        max: Option<usize>,
    },
    UnknownField,
    UnknownKind {
        kind: String,
    },
    MissingKind,
    NotAnObject,
    RequiredOneOf {
        fields: Vec<String>,
    },
    MutuallyExclusive {
        fields: Vec<String>,
    },
    DuplicateIdentity {
        identity: String,
        first: usize,
    },
    Unsupported {
        reason: String,
    },
}

fn bounds<T: fmt::Display>(min: Option<&T>, max: Option<&T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("between {min} and {max}"),
        (Some(min), None) => format!("at least {min}"),
        (None, Some(max)) => format!("at most {max}"),
        (None, None) => "unbounded".to_string(),
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "required field is missing"),
            Self::NullNotAllowed => write!(f, "required field cannot be null"),
            Self::WrongType { expected, found } => write!(f, "expected {expected}, got {found}"),
            Self::NotAChoice { value, choices } if choices.is_empty() => {
                write!(f, "'{value}' is not an allowed value")
            }
            Self::NotAChoice { value, choices } => {
                write!(f, "'{value}' is not one of: {}", choices.join(", "))
            }
            Self::OutOfRange { value, min, max } => write!(
                f,
                "{value} is out of range, must be {}",
                bounds(min.as_ref(), max.as_ref())
            ),
            Self::BadLength { len, min, max } => write!(
                f,
                "length {len} is invalid, must be {}",
                bounds(min.as_ref(), max.as_ref())
            ),
            Self::UnknownField => write!(f, "unknown field"),
            Self::UnknownKind { kind } => write!(f, "unknown resource kind '{kind}'"),
            Self::MissingKind => write!(f, "item has no 'kind'"),
            Self::NotAnObject => write!(f, "expected an object"),
            Self::RequiredOneOf { fields } => {
                write!(f, "one of the following is required: {}", fields.join(", "))
            }
            Self::MutuallyExclusive { fields } => write!(
                f,
                "parameters are mutually exclusive: {}",
                fields.join(", ")
            ),
            Self::DuplicateIdentity { identity, first } => {
                write!(f, "{identity} is already declared at config[{first}]")
            }
            Self::Unsupported { reason } => f.write_str(reason),
        }
    }
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// Location, e.g. `config[2].ipRanges[0].start`
    pub path: String,
    #[serde(rename = "message", serialize_with = "display")]
    pub kind: ViolationKind,
}

fn display<S: Serializer>(kind: &ViolationKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(kind)
}

impl Violation {
    pub fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ssid_schema() -> Schema {
        Schema::new()
            .field(FieldSpec::str("name").required().length(1, 32))
            .field(FieldSpec::str("band").choices(["2.4G", "5G", "6G", "dual"]))
            .field(FieldSpec::str("passphrase").sensitive().length(8, 63))
            .field(FieldSpec::int("vlan").range(1.0, 4094.0))
            .field(FieldSpec::bool("broadcast").default(true))
            .field(
                FieldSpec::list("ranges", FieldType::Dict).options(
                    Schema::new()
                        .field(FieldSpec::str("start").required())
                        .field(FieldSpec::str("end")),
                ),
            )
    }

    #[test]
    fn test_valid_item() {
        let item = json!({"name": "Alpha", "band": "5G", "vlan": 20});
        assert!(ssid_schema().validate(&item, "config[0]").is_empty());
    }

    #[test]
    fn test_collects_every_violation() {
        let item = json!({
            "band": "7G",
            "vlan": "20",
            "colour": "blue",
            "ranges": [{"end": "10.0.0.9"}, 5],
        });
        let violations = ssid_schema().validate(&item, "config[3]");
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "config[3].colour",
                "config[3].name",
                "config[3].band",
                "config[3].vlan",
                "config[3].ranges[0].start",
                "config[3].ranges[1]",
            ]
        );
        assert_eq!(violations[1].kind, ViolationKind::Missing);
    }

    #[test]
    fn test_no_coercion() {
        let violations = ssid_schema().validate(&json!({"name": "a", "vlan": "5"}), "");
        assert_eq!(
            violations[0].kind,
            ViolationKind::WrongType {
                expected: FieldType::Int,
                found: "str"
            }
        );
        // integral float is an int
        assert!(ssid_schema().validate(&json!({"name": "a", "vlan": 5.0}), "").is_empty());
    }

    #[test]
    fn test_null_handling() {
        let schema = ssid_schema();
        let required_null = schema.validate(&json!({"name": null}), "");
        assert_eq!(required_null[0].kind, ViolationKind::NullNotAllowed);
        assert!(schema.validate(&json!({"name": "a", "band": null}), "").is_empty());
    }

    #[test]
    fn test_sensitive_values_are_redacted() {
        let violations = ssid_schema().validate(&json!({"name": "a", "passphrase": "short"}), "x");
        assert_eq!(violations.len(), 1);
        let text = violations[0].to_string();
        assert!(!text.contains("short"));

        let schema = Schema::new().field(FieldSpec::str("secret").sensitive().choices(["s3cret"]));
        let text = schema.validate(&json!({"secret": "guess"}), "").remove(0).to_string();
        assert!(!text.contains("guess"));
        assert!(!text.contains("s3cret"));
        assert!(text.contains(REDACTED));
    }

    #[test]
    fn test_group_constraints() {
        let schema = Schema::new()
            .field(FieldSpec::str("id"))
            .field(FieldSpec::str("name"))
            .required_one_of(&["id", "name"])
            .mutually_exclusive(&["id", "name"]);
        assert_eq!(schema.validate(&json!({}), "").len(), 1);
        assert_eq!(schema.validate(&json!({"id": "1", "name": "a"}), "").len(), 1);
        assert!(schema.validate(&json!({"name": "a"}), "").is_empty());
    }

    #[test]
    fn test_defaults_are_tracked() {
        let schema = ssid_schema();
        let mut map = json!({"name": "a"}).as_object().cloned().unwrap();
        let defaulted = schema.apply_defaults(&mut map);
        assert_eq!(map["broadcast"], json!(true));
        assert!(defaulted.contains("broadcast"));

        let mut explicit = json!({"name": "a", "broadcast": true}).as_object().cloned().unwrap();
        assert!(schema.apply_defaults(&mut explicit).is_empty());
    }

    #[test]
    fn test_integral_floats_become_ints() {
        let schema = ssid_schema()
            .field(FieldSpec::new("ratio", FieldType::Float))
            .field(FieldSpec::list("ports", FieldType::Int));
        let mut map = json!({
            "name": "a",
            "vlan": 5.0,
            "ratio": 2.0,
            "ports": [80.0, 443],
            "ranges": [{"start": "10.0.0.1"}],
        })
        .as_object()
        .cloned()
        .unwrap();
        schema.normalize_ints(&mut map);
        assert_eq!(serde_json::to_string(&map["vlan"]).unwrap(), "5");
        assert!(map["ratio"].is_f64());
        assert_eq!(serde_json::to_string(&map["ports"]).unwrap(), "[80,443]");
    }

    #[test]
    fn test_violation_serializes_message() {
        let v = Violation::new("config[0].name", ViolationKind::Missing);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            json!({"path": "config[0].name", "message": "required field is missing"})
        );
    }
}
