//! Current-state loading
//!
//! Reads are cached by rendered path and query for the lifetime of one
//! [`CurrentState`], so a kind listed once is not listed again for every
//! declared item. Mutations make the cache stale; it is cleared before
//! verification re-reads.

use crate::descriptor::{Identity, ReadOp, ResourceDescriptor, extract_items};
use crate::report::OutcomeError;
use crate::schema::{NormalizedItem, render_value};
use crate::types::{ErrorKind, State};
use dnackit::{Client, ErrorCategory};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type Object = Map<String, Value>;
type ReadKey = (String, Vec<(String, String)>);

/// Why a declared item could not be looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFailure {
    pub error: OutcomeError,
    /// Stops the whole invocation instead of failing one item
    pub fatal: bool,
}

impl LookupFailure {
    fn item(error: OutcomeError) -> Self {
        Self { error, fatal: false }
    }
}

pub(crate) fn api_error(context: &str, err: &dnackit::Error) -> OutcomeError {
    OutcomeError::new(ErrorKind::from_api(err), format!("{context}: {err}"))
}

/// Cached view of the controller's current objects
pub struct CurrentState<'c> {
    client: &'c Client,
    reads: HashMap<ReadKey, Vec<Object>>,
}

impl<'c> CurrentState<'c> {
    pub fn new(client: &'c Client) -> Self {
        Self {
            client,
            reads: HashMap::new(),
        }
    }

    /// Forget every cached read.
    pub fn clear(&mut self) {
        self.reads.clear();
    }

    fn read_op(descriptor: &ResourceDescriptor) -> Option<&ReadOp> {
        descriptor.list.as_ref().or(descriptor.read.as_ref())
    }

    /// Current objects the descriptor's read returns for these values,
    /// renamed to playbook fields.
    ///
    /// A read whose path cannot be rendered, or that answers 404, is empty.
    pub fn fetch(
        &mut self,
        descriptor: &ResourceDescriptor,
        values: &Object,
    ) -> Result<Vec<Object>, OutcomeError> {
        let Some(op) = Self::read_op(descriptor) else {
            return Ok(Vec::new());
        };
        let key = match op.render(values) {
            Ok(key) => key,
            Err(e) => {
                log::debug!("{}: {e}, treating as absent", descriptor.kind);
                return Ok(Vec::new());
            }
        };
        if let Some(hit) = self.reads.get(&key) {
            return Ok(hit.clone());
        }

        let objects = read(self.client, descriptor, op, &key)
            .map_err(|e| api_error(&format!("reading {}", descriptor.kind), &e))?;
        log::debug!(
            "read {} {} object(s) from {}",
            objects.len(),
            descriptor.kind,
            key.0
        );
        self.reads.insert(key, objects.clone());
        Ok(objects)
    }

    /// Find the current object for one declared item.
    ///
    /// The item may name its object by identity fields, by id, or both. When
    /// both are given they must agree.
    pub fn lookup(
        &mut self,
        descriptor: &ResourceDescriptor,
        item: &NormalizedItem,
        state: State,
    ) -> Result<Option<Object>, LookupFailure> {
        let wanted = descriptor.identity(&item.values);
        let candidates = self
            .fetch(descriptor, &item.values)
            .map_err(LookupFailure::item)?;

        let named = match &wanted {
            Some(wanted) => unique(descriptor, &candidates, wanted)?,
            None => None,
        };

        let Some(id) = descriptor.id_of(&item.values) else {
            return Ok(named);
        };
        let by_id = match find_id(descriptor, &candidates, &id) {
            Some(found) => Some(found),
            None => self.fetch_by_id(descriptor, &id).map_err(LookupFailure::item)?,
        };

        match (by_id, named, wanted) {
            (Some(object), _, None) => Ok(Some(object)),
            (Some(object), _, Some(_))
                if descriptor.identity(&object) == descriptor.identity(&item.values) =>
            {
                Ok(Some(object))
            }
            (Some(object), _, Some(wanted)) => Err(LookupFailure::item(OutcomeError::new(
                ErrorKind::AmbiguousIdentity,
                format!(
                    "id {id} belongs to {}, not {wanted}",
                    describe(descriptor, &object)
                ),
            ))),
            (None, Some(object), Some(wanted)) => Err(LookupFailure::item(OutcomeError::new(
                ErrorKind::AmbiguousIdentity,
                format!(
                    "{wanted} exists with id {}, but id {id} does not",
                    descriptor.id_of(&object).unwrap_or_default()
                ),
            ))),
            (None, _, wanted) => match state {
                State::Deleted => Ok(None),
                _ if descriptor.promote_missing_to_create && wanted.is_some() => {
                    log::info!("{} id {id} does not exist, creating it", descriptor.kind);
                    Ok(None)
                }
                _ => Err(LookupFailure::item(OutcomeError::new(
                    ErrorKind::NotFound,
                    format!("no {} with id {id}", descriptor.kind),
                ))),
            },
        }
    }

    fn fetch_by_id(
        &mut self,
        descriptor: &ResourceDescriptor,
        id: &str,
    ) -> Result<Option<Object>, OutcomeError> {
        let Some(field) = &descriptor.id_field else {
            return Ok(None);
        };
        let values = Object::from_iter([(field.clone(), Value::String(id.to_string()))]);
        let candidates = self.fetch(descriptor, &values)?;
        Ok(find_id(descriptor, &candidates, id))
    }

    /// Current objects of a kind that no declared item covers, limited to the
    /// declared items' scope.
    pub fn undeclared(
        &mut self,
        descriptor: &ResourceDescriptor,
        declared: &[&NormalizedItem],
    ) -> Result<Vec<(Identity, Object)>, OutcomeError> {
        let mut identities = BTreeSet::new();
        let mut ids = BTreeSet::new();
        let mut scopes = BTreeSet::new();
        for item in declared {
            identities.extend(descriptor.identity(&item.values));
            ids.extend(descriptor.id_of(&item.values));
            scopes.insert(scope_of(descriptor, &item.values));
        }

        // identity -> id (or full value) of the object first seen under it;
        // overlapping scopes re-read the same object
        let mut seen: BTreeMap<Identity, String> = BTreeMap::new();
        let mut found = Vec::new();
        for scope in &scopes {
            let values: Object = descriptor
                .scope_fields
                .iter()
                .cloned()
                .zip(scope.iter().map(|v| Value::String(v.clone())))
                .collect();
            for object in self.fetch(descriptor, &values)? {
                let Some(identity) = descriptor.item_identity(&object) else {
                    continue;
                };
                let declared_id = descriptor.id_of(&object).is_some_and(|id| ids.contains(&id));
                if identities.contains(&identity)
                    || declared_id
                    || !scopes.contains(&scope_of(descriptor, &object))
                {
                    continue;
                }
                let key = descriptor
                    .id_of(&object)
                    .unwrap_or_else(|| Value::Object(object.clone()).to_string());
                match seen.get(&identity) {
                    Some(first) if *first == key => continue,
                    Some(_) => {
                        return Err(OutcomeError::new(
                            ErrorKind::DuplicateIdentity,
                            format!("controller returned more than one object for {identity}"),
                        ));
                    }
                    None => {
                        seen.insert(identity.clone(), key);
                    }
                }
                found.push((identity, object));
            }
        }
        Ok(found)
    }

    /// Fresh read of one object by identity, bypassing the cache.
    ///
    /// Used before retrying a create to see if an earlier attempt landed.
    pub fn probe(
        client: &Client,
        descriptor: &ResourceDescriptor,
        values: &Object,
    ) -> dnackit::Result<Option<Value>> {
        let Some(op) = Self::read_op(descriptor) else {
            return Ok(None);
        };
        let Some(wanted) = descriptor.identity(values) else {
            return Ok(None);
        };
        let Ok(key) = op.render(values) else {
            return Ok(None);
        };
        let objects = read(client, descriptor, op, &key)?;
        Ok(objects
            .into_iter()
            .find(|o| descriptor.identity(o).as_ref() == Some(&wanted))
            .map(Value::Object))
    }
}

fn read(
    client: &Client,
    descriptor: &ResourceDescriptor,
    op: &ReadOp,
    (path, query): &ReadKey,
) -> dnackit::Result<Vec<Object>> {
    let body = match client.get(path, query) {
        Ok(body) => body,
        Err(e) if e.category() == ErrorCategory::NotFound => Value::Null,
        Err(e) => return Err(e),
    };
    Ok(extract_items(&body, &op.pointer)
        .iter()
        .filter_map(|raw| descriptor.normalize_current(raw))
        .collect())
}

/// The one candidate with this identity; two is a controller inconsistency.
fn unique(
    descriptor: &ResourceDescriptor,
    candidates: &[Object],
    wanted: &Identity,
) -> Result<Option<Object>, LookupFailure> {
    let mut matches = candidates
        .iter()
        .filter(|c| descriptor.identity(c).as_ref() == Some(wanted));
    let first = matches.next().cloned();
    let extra = matches.count();
    if extra > 0 {
        return Err(LookupFailure {
            error: OutcomeError::new(
                ErrorKind::DuplicateIdentity,
                format!("controller returned {} objects for {wanted}", extra + 1),
            ),
            fatal: true,
        });
    }
    Ok(first)
}

fn find_id(descriptor: &ResourceDescriptor, candidates: &[Object], id: &str) -> Option<Object> {
    candidates
        .iter()
        .find(|c| descriptor.id_of(c).as_deref() == Some(id))
        .cloned()
}

fn describe(descriptor: &ResourceDescriptor, object: &Object) -> String {
    descriptor
        .identity(object)
        .map_or_else(|| format!("an unnamed {}", descriptor.kind), |i| i.to_string())
}

fn scope_of(descriptor: &ResourceDescriptor, values: &Object) -> Vec<String> {
    descriptor
        .scope_fields
        .iter()
        .map(|f| values.get(f).map(render_value).unwrap_or_default())
        .collect()
}
