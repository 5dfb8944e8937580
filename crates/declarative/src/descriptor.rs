//! Resource descriptors - how one kind is read, compared and mutated
//!
//! A [`ResourceDescriptor`] is plain data. The reconciler never knows what
//! an SSID or a site is; it only follows the descriptor: which fields name
//! an object, which ones are compared, where to list it, and which endpoint
//! creates, updates or deletes it. Descriptors are collected into an
//! immutable [`Registry`] before reconciliation starts.

use crate::error::{Error, Result};
use crate::schema::{NormalizedItem, Schema, render_value};
use crate::types::OpKind;
use dnackit::Method;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Bytes escaped in a rendered path segment: all but RFC 3986 unreserved
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// How a mutating endpoint reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The response body is the final result
    Inline,
    /// The response body is a task or execution handle to poll
    Task,
}

/// How the payload is wrapped in the request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    Object,
    /// `[payload]`
    List,
    /// No body; everything travels in the path and query
    None,
}

/// A read (list or by-identity)
#[derive(Debug, Clone)]
pub struct ReadOp {
    /// Path template, e.g. `/dna/system/api/v1/user/{id}`
    pub path: String,
    /// Query templates; pairs whose placeholder has no value are omitted
    pub query: Vec<(String, String)>,
    /// JSON pointer to the item collection in the response
    pub pointer: String,
}

impl ReadOp {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            pointer: "/response".to_string(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.query.push((key.into(), template.into()));
        self
    }

    pub fn pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = pointer.into();
        self
    }

    /// Render path and query against playbook-named values.
    pub fn render(&self, values: &Map<String, Value>) -> Result<(String, Vec<(String, String)>)> {
        Ok((
            render_path(&self.path, values)?,
            render_query(&self.query, values),
        ))
    }
}

/// A mutating endpoint
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub delivery: Delivery,
    pub body: BodyShape,
    /// Progress text that means success even without `endTime`
    pub success_pattern: Option<Regex>,
}

impl Endpoint {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            delivery: Delivery::Task,
            body: if method == Method::Delete {
                BodyShape::None
            } else {
                BodyShape::Object
            },
            success_pattern: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn inline(mut self) -> Self {
        self.delivery = Delivery::Inline;
        self
    }

    pub fn body(mut self, shape: BodyShape) -> Self {
        self.body = shape;
        self
    }

    pub fn query(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.query.push((key.into(), template.into()));
        self
    }

    pub fn success_pattern(mut self, pattern: Regex) -> Self {
        self.success_pattern = Some(pattern);
        self
    }
}

/// A field whose value names another item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyKey {
    /// Field on this kind holding the reference
    pub field: String,
    pub target_kind: String,
    /// Field on the target kind the reference matches
    pub target_field: String,
}

/// Identity tuple of one object, e.g. `ssid[name=Alpha]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    pub kind: String,
    pub parts: Vec<(String, String)>,
}

impl Identity {
    pub fn new(kind: impl Into<String>, parts: Vec<(String, String)>) -> Self {
        Self {
            kind: kind.into(),
            parts,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}[{}]", self.kind, parts.join(","))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Reshapes one object between the controller's layout and a flat map.
///
/// Runs in controller field names: before renaming on reads, after renaming
/// on writes.
pub type Reshape = fn(&Map<String, Value>) -> Map<String, Value>;

/// Everything the reconciler knows about one resource kind
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub kind: String,
    pub description: String,
    pub schema: Schema,
    /// Fields that together name an object
    pub identity: Vec<String>,
    /// Field holding the controller-assigned id, if the kind has one
    pub id_field: Option<String>,
    /// Fields that participate in equality, in schema order
    pub comparable: Vec<String>,
    /// Comparable list fields where order matters
    pub ordered: BTreeSet<String>,
    pub case_insensitive: BTreeSet<String>,
    /// Fields the controller never returns (passwords, keys)
    pub write_only: BTreeSet<String>,
    pub dependencies: Vec<DependencyKey>,
    pub list: Option<ReadOp>,
    pub read: Option<ReadOp>,
    pub create: Option<Endpoint>,
    pub update: Option<Endpoint>,
    pub delete: Option<Endpoint>,
    /// Playbook field name to controller field name
    pub api_names: BTreeMap<String, String>,
    /// Flattens a controller object whose layout differs from the writes
    pub decode: Option<Reshape>,
    /// Builds the controller layout from a flat, renamed payload
    pub encode: Option<Reshape>,
    /// Fields bounding which undeclared objects `replaced` may delete
    pub scope_fields: Vec<String>,
    /// An update on a vanished object becomes a create
    pub promote_missing_to_create: bool,
    /// A failed operation of this kind stops the rest of the plan
    pub plan_fatal: bool,
}

impl ResourceDescriptor {
    pub fn builder(kind: impl Into<String>, schema: Schema) -> DescriptorBuilder {
        DescriptorBuilder::new(kind, schema)
    }

    /// Identity from the identity fields, if all of them have values.
    pub fn identity(&self, values: &Map<String, Value>) -> Option<Identity> {
        let parts = self
            .identity
            .iter()
            .map(|field| {
                let value = values.get(field).filter(|v| !v.is_null())?;
                Some((field.clone(), self.identity_text(field, value)))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Identity::new(self.kind.clone(), parts))
    }

    /// Identity of a desired item: identity fields, or the id when those are absent.
    pub fn item_identity(&self, values: &Map<String, Value>) -> Option<Identity> {
        self.identity(values).or_else(|| {
            let field = self.id_field.as_ref()?;
            let id = values.get(field).filter(|v| !v.is_null())?;
            Some(Identity::new(
                self.kind.clone(),
                vec![(field.clone(), render_value(id))],
            ))
        })
    }

    fn identity_text(&self, field: &str, value: &Value) -> String {
        let text = render_value(value);
        if self.case_insensitive.contains(field) {
            text.to_lowercase()
        } else {
            text
        }
    }

    /// Controller id of an object, if the kind has one.
    pub fn id_of(&self, values: &Map<String, Value>) -> Option<String> {
        let field = self.id_field.as_ref()?;
        values.get(field).filter(|v| !v.is_null()).map(render_value)
    }

    /// Controller field name for a playbook field.
    pub fn api_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.api_names.get(field).map_or(field, String::as_str)
    }

    /// Rename a controller object to playbook field names.
    pub fn normalize_current(&self, raw: &Value) -> Option<Map<String, Value>> {
        let decoded;
        let object = match (self.decode, raw.as_object()?) {
            (Some(decode), object) => {
                decoded = decode(object);
                &decoded
            }
            (None, object) => object,
        };
        let reverse: BTreeMap<&str, &str> = self
            .api_names
            .iter()
            .map(|(playbook, api)| (api.as_str(), playbook.as_str()))
            .collect();
        Some(
            object
                .iter()
                .map(|(key, value)| {
                    let name = reverse.get(key.as_str()).copied().unwrap_or(key);
                    (name.to_string(), value.clone())
                })
                .collect(),
        )
    }

    /// Rename playbook fields to controller field names.
    pub fn to_api(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        let renamed: Map<String, Value> = payload
            .iter()
            .map(|(key, value)| (self.api_name(key).to_string(), value.clone()))
            .collect();
        match self.encode {
            Some(encode) => encode(&renamed),
            None => renamed,
        }
    }

    /// Payload for an operation, in playbook field names.
    ///
    /// Creates send every non-null desired value, defaults included. Updates
    /// start from the current object's schema fields and overlay only what
    /// was given explicitly, so defaults never overwrite current values.
    /// Write-only fields are sent only when given.
    pub fn payload(
        &self,
        kind: OpKind,
        item: &NormalizedItem,
        current: Option<&Map<String, Value>>,
    ) -> Map<String, Value> {
        match kind {
            OpKind::Create => item
                .values
                .iter()
                .filter(|(key, value)| {
                    !value.is_null() && self.id_field.as_deref() != Some(key.as_str())
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            OpKind::Update => {
                let mut payload = Map::new();
                if let Some(current) = current {
                    for field in &self.schema.fields {
                        if self.write_only.contains(&field.name) {
                            continue;
                        }
                        if let Some(value) = current.get(&field.name) {
                            payload.insert(field.name.clone(), value.clone());
                        }
                    }
                }
                for (key, value) in &item.values {
                    if item.is_explicit(key) {
                        payload.insert(key.clone(), value.clone());
                    }
                }
                if let (Some(field), Some(id)) = (&self.id_field, current.and_then(|c| self.id_of(c))) {
                    payload.insert(field.clone(), Value::String(id));
                }
                payload
            }
            OpKind::Delete | OpKind::Noop => {
                let mut payload = Map::new();
                let source = current.unwrap_or(&item.values);
                for field in self.identity.iter().chain(self.id_field.iter()) {
                    if let Some(value) = source.get(field).or_else(|| item.values.get(field)) {
                        payload.insert(field.clone(), value.clone());
                    }
                }
                payload
            }
        }
    }

    /// Request body for `endpoint`, in controller field names.
    pub fn request_body(&self, endpoint: &Endpoint, payload: &Map<String, Value>) -> Option<Value> {
        let object = Value::Object(self.to_api(payload));
        match endpoint.body {
            BodyShape::Object => Some(object),
            BodyShape::List => Some(Value::Array(vec![object])),
            BodyShape::None => None,
        }
    }

    /// Sensitive-aware rendering of one field value.
    pub fn render(&self, field: &str, value: &Value) -> String {
        if self.schema.is_sensitive(field) {
            crate::schema::REDACTED.to_string()
        } else {
            render_value(value)
        }
    }
}

/// Pick the objects out of a read response.
///
/// An object at the pointer is a one-element list; null or missing is empty.
pub fn extract_items(body: &Value, pointer: &str) -> Vec<Value> {
    let target = if pointer.is_empty() {
        Some(body)
    } else {
        body.pointer(pointer)
    };
    match target {
        Some(Value::Array(items)) => items.iter().filter(|i| i.is_object()).cloned().collect(),
        Some(object @ Value::Object(_)) => vec![object.clone()],
        _ => Vec::new(),
    }
}

fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        names.push(&rest[open + 1..open + close]);
        rest = &rest[open + close + 1..];
    }
    names
}

fn lookup<'a>(values: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    values.get(field).filter(|v| !v.is_null())
}

/// Render `{field}` placeholders in a path; every placeholder must resolve.
pub fn render_path(template: &str, values: &Map<String, Value>) -> Result<String> {
    let mut out = template.to_string();
    for name in placeholders(template) {
        let value = lookup(values, name).ok_or_else(|| Error::Template {
            template: template.to_string(),
            field: name.to_string(),
        })?;
        let segment = utf8_percent_encode(&render_value(value), PATH_SEGMENT).to_string();
        out = out.replace(&format!("{{{name}}}"), &segment);
    }
    Ok(out)
}

/// Render query templates, dropping pairs with unresolved placeholders.
pub fn render_query(pairs: &[(String, String)], values: &Map<String, Value>) -> Vec<(String, String)> {
    pairs
        .iter()
        .filter_map(|(key, template)| {
            let mut out = template.clone();
            for name in placeholders(template) {
                let value = lookup(values, name)?;
                out = out.replace(&format!("{{{name}}}"), &render_value(value));
            }
            Some((key.clone(), out))
        })
        .collect()
}

/// Builder that checks a descriptor for consistency
pub struct DescriptorBuilder {
    inner: ResourceDescriptor,
    comparable_set: bool,
}

impl DescriptorBuilder {
    pub fn new(kind: impl Into<String>, schema: Schema) -> Self {
        Self {
            inner: ResourceDescriptor {
                kind: kind.into(),
                description: String::new(),
                schema,
                identity: Vec::new(),
                id_field: None,
                comparable: Vec::new(),
                ordered: BTreeSet::new(),
                case_insensitive: BTreeSet::new(),
                write_only: BTreeSet::new(),
                dependencies: Vec::new(),
                list: None,
                read: None,
                create: None,
                update: None,
                delete: None,
                api_names: BTreeMap::new(),
                decode: None,
                encode: None,
                scope_fields: Vec::new(),
                promote_missing_to_create: false,
                plan_fatal: false,
            },
            comparable_set: false,
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.inner.description = text.into();
        self
    }

    pub fn identity(mut self, fields: &[&str]) -> Self {
        self.inner.identity = strings(fields);
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.inner.id_field = Some(field.into());
        self
    }

    /// Restrict equality to these fields (default: every schema field except the id).
    pub fn comparable(mut self, fields: &[&str]) -> Self {
        self.inner.comparable = strings(fields);
        self.comparable_set = true;
        self
    }

    pub fn ordered(mut self, fields: &[&str]) -> Self {
        self.inner.ordered.extend(strings(fields));
        self
    }

    pub fn case_insensitive(mut self, fields: &[&str]) -> Self {
        self.inner.case_insensitive.extend(strings(fields));
        self
    }

    pub fn write_only(mut self, fields: &[&str]) -> Self {
        self.inner.write_only.extend(strings(fields));
        self
    }

    pub fn depends_on(mut self, field: &str, target_kind: &str, target_field: &str) -> Self {
        self.inner.dependencies.push(DependencyKey {
            field: field.to_string(),
            target_kind: target_kind.to_string(),
            target_field: target_field.to_string(),
        });
        self
    }

    pub fn list(mut self, op: ReadOp) -> Self {
        self.inner.list = Some(op);
        self
    }

    pub fn read(mut self, op: ReadOp) -> Self {
        self.inner.read = Some(op);
        self
    }

    pub fn create(mut self, endpoint: Endpoint) -> Self {
        self.inner.create = Some(endpoint);
        self
    }

    pub fn update(mut self, endpoint: Endpoint) -> Self {
        self.inner.update = Some(endpoint);
        self
    }

    pub fn delete(mut self, endpoint: Endpoint) -> Self {
        self.inner.delete = Some(endpoint);
        self
    }

    pub fn api_name(mut self, field: &str, api: &str) -> Self {
        self.inner
            .api_names
            .insert(field.to_string(), api.to_string());
        self
    }

    /// Flatten controller objects with `decode` before renaming.
    pub fn decode(mut self, decode: Reshape) -> Self {
        self.inner.decode = Some(decode);
        self
    }

    /// Reshape renamed payloads with `encode` before sending.
    pub fn encode(mut self, encode: Reshape) -> Self {
        self.inner.encode = Some(encode);
        self
    }

    pub fn scope(mut self, fields: &[&str]) -> Self {
        self.inner.scope_fields = strings(fields);
        self
    }

    pub fn promote_missing_to_create(mut self) -> Self {
        self.inner.promote_missing_to_create = true;
        self
    }

    pub fn plan_fatal(mut self) -> Self {
        self.inner.plan_fatal = true;
        self
    }

    pub fn build(mut self) -> Result<ResourceDescriptor> {
        let d = &mut self.inner;
        let kind = d.kind.clone();
        let fail = |message: String| Err(Error::descriptor(&kind, message));

        if d.identity.is_empty() {
            return fail("at least one identity field is required".to_string());
        }
        if d.list.is_none() && d.read.is_none() {
            return fail("a list or read operation is required".to_string());
        }

        if !self.comparable_set {
            d.comparable = d
                .schema
                .fields
                .iter()
                .map(|f| f.name.clone())
                .filter(|name| d.id_field.as_ref() != Some(name))
                .collect();
        }

        let declared = d
            .identity
            .iter()
            .chain(d.id_field.iter())
            .chain(d.comparable.iter())
            .chain(d.ordered.iter())
            .chain(d.case_insensitive.iter())
            .chain(d.write_only.iter())
            .chain(d.scope_fields.iter())
            .chain(d.api_names.keys())
            .chain(d.dependencies.iter().map(|k| &k.field));
        for field in declared {
            if !d.schema.contains(field) {
                return fail(format!("field '{field}' is not in the schema"));
            }
        }

        if let Some(field) = d.ordered.iter().find(|f| !d.comparable.contains(f)) {
            return fail(format!("ordered field '{field}' is not comparable"));
        }

        Ok(self.inner)
    }
}

fn strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(ToString::to_string).collect()
}

/// Immutable map from kind to descriptor
#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: BTreeMap<String, Arc<ResourceDescriptor>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.kinds.get(kind)
    }

    /// Registered kinds in name order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Collects descriptors and checks cross-kind references
#[derive(Default)]
pub struct RegistryBuilder {
    kinds: BTreeMap<String, Arc<ResourceDescriptor>>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: ResourceDescriptor) -> Result<Self> {
        if self.kinds.contains_key(&descriptor.kind) {
            return Err(Error::DuplicateKind(descriptor.kind));
        }
        self.kinds
            .insert(descriptor.kind.clone(), Arc::new(descriptor));
        Ok(self)
    }

    pub fn build(self) -> Result<Registry> {
        for descriptor in self.kinds.values() {
            for key in &descriptor.dependencies {
                let Some(target) = self.kinds.get(&key.target_kind) else {
                    return Err(Error::descriptor(
                        &descriptor.kind,
                        format!("dependency on unknown kind '{}'", key.target_kind),
                    ));
                };
                if !target.schema.contains(&key.target_field) {
                    return Err(Error::descriptor(
                        &descriptor.kind,
                        format!(
                            "dependency target '{}.{}' is not in the schema",
                            key.target_kind, key.target_field
                        ),
                    ));
                }
            }
        }
        Ok(Registry { kinds: self.kinds })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn user() -> ResourceDescriptor {
        ResourceDescriptor::builder(
            "user",
            Schema::new()
                .field(FieldSpec::str("id"))
                .field(FieldSpec::str("username").required())
                .field(FieldSpec::str("email"))
                .field(FieldSpec::str("password").sensitive())
                .field(FieldSpec::str("firstName").default("")),
        )
        .identity(&["username"])
        .id_field("id")
        .case_insensitive(&["email"])
        .write_only(&["password"])
        .api_name("id", "userId")
        .list(ReadOp::new("/dna/system/api/v1/user").pointer("/response/users"))
        .create(Endpoint::post("/dna/system/api/v1/user").inline())
        .update(Endpoint::put("/dna/system/api/v1/user").inline())
        .delete(Endpoint::delete("/dna/system/api/v1/user/{id}").inline())
        .build()
        .unwrap()
    }

    fn item(values: Value, defaulted: &[&str]) -> NormalizedItem {
        NormalizedItem {
            kind: "user".to_string(),
            index: 0,
            values: values.as_object().cloned().unwrap(),
            defaulted: defaulted.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_identity() {
        let d = user();
        let values = json!({"username": "alice", "id": "u-1"});
        let identity = d.identity(values.as_object().unwrap()).unwrap();
        assert_eq!(identity.to_string(), "user[username=alice]");

        let by_id = d.item_identity(json!({"id": "u-1"}).as_object().unwrap()).unwrap();
        assert_eq!(by_id.to_string(), "user[id=u-1]");
        assert!(d.item_identity(json!({"email": "x"}).as_object().unwrap()).is_none());
    }

    #[test]
    fn test_comparable_defaults_exclude_id() {
        let d = user();
        assert!(!d.comparable.contains(&"id".to_string()));
        assert!(d.comparable.contains(&"email".to_string()));
    }

    #[test]
    fn test_builder_rejects_unknown_fields() {
        let err = ResourceDescriptor::builder("x", Schema::new().field(FieldSpec::str("name")))
            .identity(&["nmae"])
            .list(ReadOp::new("/x"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nmae"));

        let err = ResourceDescriptor::builder("x", Schema::new().field(FieldSpec::str("name")))
            .identity(&["name"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("list or read"));
    }

    #[test]
    fn test_api_names_round_trip_the_boundary() {
        let d = user();
        let current = d
            .normalize_current(&json!({"userId": "u-1", "username": "alice"}))
            .unwrap();
        assert_eq!(current["id"], "u-1");
        assert_eq!(d.to_api(&current)["userId"], "u-1");
    }

    #[test]
    fn test_reshape_hooks_wrap_renaming() {
        fn unwrap_profile(object: &Map<String, Value>) -> Map<String, Value> {
            let mut flat = object.clone();
            if let Some(Value::Object(profile)) = flat.remove("profile") {
                flat.extend(profile);
            }
            flat
        }
        fn wrap_profile(object: &Map<String, Value>) -> Map<String, Value> {
            let mut outer = object.clone();
            let email = outer.remove("email").unwrap_or(Value::Null);
            outer.insert("profile".to_string(), json!({"email": email}));
            outer
        }

        let d = DescriptorBuilder {
            inner: user(),
            comparable_set: true,
        }
        .decode(unwrap_profile)
        .encode(wrap_profile)
        .build()
        .unwrap();

        let current = d
            .normalize_current(&json!({"userId": "u-1", "profile": {"email": "a@x"}}))
            .unwrap();
        assert_eq!(current["id"], "u-1");
        assert_eq!(current["email"], "a@x");

        let body = d.to_api(&current);
        assert_eq!(body["userId"], "u-1");
        assert_eq!(body["profile"], json!({"email": "a@x"}));
        assert!(!body.contains_key("email"));
    }

    #[test]
    fn test_payloads() {
        let d = user();
        let desired = item(
            json!({"username": "alice", "email": "a@x", "password": "pw", "firstName": "", "id": null}),
            &["firstName"],
        );

        let create = d.payload(OpKind::Create, &desired, None);
        assert_eq!(create["firstName"], "");
        assert!(!create.contains_key("id"));

        let current = json!({"id": "u-1", "username": "alice", "email": "old@x", "firstName": "Al"});
        let update = d.payload(OpKind::Update, &desired, current.as_object());
        assert_eq!(update["id"], "u-1");
        assert_eq!(update["email"], "a@x");
        // defaults never overwrite current values
        assert_eq!(update["firstName"], "Al");
        assert_eq!(update["password"], "pw");

        let body = d.request_body(d.update.as_ref().unwrap(), &update).unwrap();
        assert_eq!(body["userId"], "u-1");
    }

    #[test]
    fn test_templates() {
        let values = json!({"name": "Global/San Jose", "id": "s-1"});
        let values = values.as_object().unwrap();
        assert_eq!(
            render_path("/dna/intent/api/v1/site/{id}", values).unwrap(),
            "/dna/intent/api/v1/site/s-1"
        );
        assert_eq!(
            render_path("/x/{name}", values).unwrap(),
            "/x/Global%2FSan%20Jose"
        );
        assert!(render_path("/x/{missing}", values).is_err());

        let odd = json!({"name": "ap-1.lab_b~2 #3?x=y"});
        assert_eq!(
            render_path("/x/{name}", odd.as_object().unwrap()).unwrap(),
            "/x/ap-1.lab_b~2%20%233%3Fx%3Dy"
        );

        let query = render_query(
            &[
                ("name".to_string(), "{name}".to_string()),
                ("type".to_string(), "{type}".to_string()),
                ("limit".to_string(), "500".to_string()),
            ],
            values,
        );
        assert_eq!(
            query,
            vec![
                ("name".to_string(), "Global/San Jose".to_string()),
                ("limit".to_string(), "500".to_string())
            ]
        );
    }

    #[test]
    fn test_extract_items() {
        assert_eq!(extract_items(&json!({"response": [{"a": 1}, 2]}), "/response").len(), 1);
        assert_eq!(extract_items(&json!({"response": {"a": 1}}), "/response").len(), 1);
        assert!(extract_items(&json!({"response": null}), "/response").is_empty());
        assert!(extract_items(&json!({}), "/response").is_empty());
    }

    #[test]
    fn test_registry_checks_dependencies() {
        let ssid = ResourceDescriptor::builder(
            "ssid",
            Schema::new()
                .field(FieldSpec::str("name"))
                .field(FieldSpec::str("site")),
        )
        .identity(&["name"])
        .depends_on("site", "site", "name")
        .list(ReadOp::new("/ssid"))
        .build()
        .unwrap();

        let err = Registry::builder().register(ssid.clone()).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("unknown kind"));

        let dup = Registry::builder().register(user()).unwrap().register(user());
        assert!(matches!(dup.err(), Some(Error::DuplicateKind(_))));
    }
}
