//! Operation planning - decide and order operations per identity
//!
//! Every declared item becomes exactly one [`Op`]. Mutating ops are ordered
//! topologically by dependency keys: a referenced item is created or updated
//! before its referencers, and a referencer is deleted before what it
//! references. Among ops with no ordering constraint, declaration order wins.

use crate::descriptor::{DependencyKey, Identity, ResourceDescriptor};
use crate::equality::{FieldChange, diff};
use crate::schema::{NormalizedItem, render_value};
use crate::types::{OpKind, State};
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt;
use std::sync::Arc;

/// One declared item together with what the controller currently has
#[derive(Debug, Clone)]
pub struct Assessment {
    pub item: NormalizedItem,
    pub identity: Identity,
    pub descriptor: Arc<ResourceDescriptor>,
    /// Current object in playbook field names, `None` when absent
    pub current: Option<Map<String, Value>>,
}

/// A current object no declared item covers (only under `replaced`)
#[derive(Debug, Clone)]
pub struct Undeclared {
    pub identity: Identity,
    pub descriptor: Arc<ResourceDescriptor>,
    pub current: Map<String, Value>,
}

/// Planner input
#[derive(Debug, Clone, Default)]
pub struct PlanInput {
    pub state: State,
    /// Declared items that were looked up successfully, in declaration order
    pub items: Vec<Assessment>,
    pub undeclared: Vec<Undeclared>,
    /// Items that already failed; anything referencing them fails too
    pub failed: BTreeSet<Identity>,
}

/// One planned operation
#[derive(Clone)]
pub struct Op {
    pub kind: OpKind,
    pub identity: Identity,
    pub descriptor: Arc<ResourceDescriptor>,
    /// Request fields in playbook names
    pub payload: Map<String, Value>,
    /// Declaration index; undeclared deletes come after every declared item
    pub index: Option<usize>,
    pub changes: Vec<FieldChange>,
    pub current: Option<Map<String, Value>>,
    pub desired: Option<NormalizedItem>,
    /// Ops that must succeed before this one runs
    pub requires: Vec<Identity>,
    /// A dependency that cannot be satisfied (being deleted, or already failed)
    pub blocked_by: Option<Identity>,
}

impl Op {
    /// Values used to render endpoint templates: current, overlaid by the payload.
    pub fn template_values(&self) -> Map<String, Value> {
        let mut values = self.current.clone().unwrap_or_default();
        for (key, value) in &self.payload {
            values.insert(key.clone(), value.clone());
        }
        values
    }
}

impl fmt::Debug for Op {
    // Payloads may carry secrets; show only the field names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&String> = self.payload.keys().collect();
        f.debug_struct("Op")
            .field("kind", &self.kind)
            .field("identity", &self.identity.to_string())
            .field("index", &self.index)
            .field("payload_fields", &fields)
            .field("changes", &self.changes.iter().map(ToString::to_string).collect::<Vec<_>>())
            .field("requires", &self.requires)
            .field("blocked_by", &self.blocked_by)
            .finish()
    }
}

/// Ordered operations for one invocation
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub ops: Vec<Op>,
}

impl Plan {
    /// Mutating ops only, in execution order.
    pub fn mutations(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter().filter(|op| op.kind.is_mutating())
    }

    pub fn count(&self, kind: OpKind) -> usize {
        self.ops.iter().filter(|op| op.kind == kind).count()
    }

    pub fn has_changes(&self) -> bool {
        self.mutations().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Dependency keys form a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCycle {
    /// Members in cycle order, first repeated at the end
    pub members: Vec<Identity>,
}

impl fmt::Display for DependencyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.members.iter().map(ToString::to_string).collect();
        write!(f, "dependency cycle: {}", names.join(" -> "))
    }
}

/// Decide one op per item and order them.
pub fn plan(input: PlanInput) -> Result<Plan, DependencyCycle> {
    let mut ops: Vec<Op> = input
        .items
        .into_iter()
        .map(|a| decide(input.state, a))
        .collect();

    let mut undeclared = input.undeclared;
    undeclared.sort_by(|a, b| a.identity.cmp(&b.identity));
    ops.extend(undeclared.into_iter().map(|u| Op {
        kind: OpKind::Delete,
        payload: u.descriptor.payload(
            OpKind::Delete,
            &NormalizedItem {
                kind: u.descriptor.kind.clone(),
                index: usize::MAX,
                values: u.current.clone(),
                defaulted: BTreeSet::new(),
            },
            Some(&u.current),
        ),
        identity: u.identity,
        descriptor: u.descriptor,
        index: None,
        changes: Vec::new(),
        current: Some(u.current),
        desired: None,
        requires: Vec::new(),
        blocked_by: None,
    }));

    let edges = link(&mut ops, &input.failed);
    let order = topological(&ops, &edges)?;

    let mut slots: Vec<Option<Op>> = ops.into_iter().map(Some).collect();
    let ops = order.into_iter().filter_map(|i| slots[i].take()).collect();
    Ok(Plan { ops })
}

fn decide(state: State, a: Assessment) -> Op {
    let (kind, changes) = match (state, &a.current) {
        (State::Deleted, Some(_)) => (OpKind::Delete, Vec::new()),
        (State::Deleted, None) => (OpKind::Noop, Vec::new()),
        (_, None) => (OpKind::Create, Vec::new()),
        (_, Some(current)) => {
            let changes = diff(&a.descriptor, current, &a.item);
            if changes.is_empty() {
                (OpKind::Noop, changes)
            } else {
                (OpKind::Update, changes)
            }
        }
    };

    log::info!("planned {kind} {}", a.identity);
    for change in &changes {
        log::debug!("  {change}");
    }

    Op {
        kind,
        payload: a.descriptor.payload(kind, &a.item, a.current.as_ref()),
        identity: a.identity,
        index: Some(a.item.index),
        changes,
        current: a.current,
        desired: Some(a.item),
        descriptor: a.descriptor,
        requires: Vec::new(),
        blocked_by: None,
    }
}

/// Value of a referencing or referenced field, for matching.
fn key_values(op: &Op, field: &str, descriptor: &ResourceDescriptor) -> Vec<String> {
    let value = op
        .desired
        .as_ref()
        .and_then(|d| d.values.get(field))
        .or_else(|| op.current.as_ref().and_then(|c| c.get(field)));
    let normalize = |v: &Value| {
        let text = render_value(v);
        if descriptor.case_insensitive.contains(field) {
            text.to_lowercase()
        } else {
            text
        }
    };
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(normalize).collect(),
        Some(v) => vec![normalize(v)],
    }
}

/// Targets of `key` referenced by `op`.
fn targets(ops: &[Op], op: &Op, key: &DependencyKey) -> Vec<usize> {
    let wanted = key_values(op, &key.field, &op.descriptor);
    if wanted.is_empty() {
        return Vec::new();
    }
    ops.iter()
        .enumerate()
        .filter(|(_, t)| t.descriptor.kind == key.target_kind)
        .filter(|(_, t)| {
            key_values(t, &key.target_field, &t.descriptor)
                .iter()
                .any(|v| wanted.contains(v))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Build ordering edges (`from` runs before `to`) and record blocked ops.
fn link(ops: &mut [Op], failed: &BTreeSet<Identity>) -> BTreeMap<usize, BTreeSet<usize>> {
    let mut edges: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    let mut requires: Vec<Vec<Identity>> = vec![Vec::new(); ops.len()];
    let mut blocked: Vec<Option<Identity>> = vec![None; ops.len()];

    for (i, op) in ops.iter().enumerate() {
        for key in &op.descriptor.dependencies {
            let wanted = key_values(op, &key.field, &op.descriptor);
            if op.kind != OpKind::Delete
                && let Some(bad) = failed.iter().find(|f| {
                    f.kind == key.target_kind
                        && f.parts
                            .iter()
                            .any(|(field, value)| *field == key.target_field && wanted.contains(value))
                })
            {
                blocked[i] = Some(bad.clone());
            }

            for t in targets(ops, op, key) {
                let target = &ops[t];
                match (op.kind, target.kind) {
                    // referencer goes first when both are deleted
                    (OpKind::Delete, OpKind::Delete) => {
                        edges.entry(i).or_default().insert(t);
                    }
                    (OpKind::Delete, _) => {}
                    (_, OpKind::Delete) => blocked[i] = Some(target.identity.clone()),
                    _ => {
                        edges.entry(t).or_default().insert(i);
                        if target.kind.is_mutating() {
                            requires[i].push(target.identity.clone());
                        }
                    }
                }
            }
        }
    }

    for (op, (req, block)) in ops.iter_mut().zip(requires.into_iter().zip(blocked)) {
        op.requires = req;
        if op.kind.is_mutating() {
            op.blocked_by = block;
        }
    }
    edges
}

/// Kahn's algorithm, ties broken by position (declaration order).
fn topological(
    ops: &[Op],
    edges: &BTreeMap<usize, BTreeSet<usize>>,
) -> Result<Vec<usize>, DependencyCycle> {
    let mut indegree = vec![0_usize; ops.len()];
    for targets in edges.values() {
        for &t in targets {
            indegree[t] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, d)| *d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(ops.len());

    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &t in edges.get(&i).into_iter().flatten() {
            indegree[t] -= 1;
            if indegree[t] == 0 {
                ready.push(Reverse(t));
            }
        }
    }

    if order.len() == ops.len() {
        return Ok(order);
    }

    let remaining: BTreeSet<usize> = (0..ops.len()).filter(|i| indegree[*i] > 0).collect();
    Err(DependencyCycle {
        members: find_cycle(&remaining, edges)
            .into_iter()
            .map(|i| ops[i].identity.clone())
            .collect(),
    })
}

/// Walk edges among `remaining` until a node repeats.
fn find_cycle(remaining: &BTreeSet<usize>, edges: &BTreeMap<usize, BTreeSet<usize>>) -> Vec<usize> {
    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut seen: BTreeMap<usize, usize> = BTreeMap::from([(start, 0)]);
    let mut node = start;
    loop {
        // every remaining node has a remaining predecessor; follow successors
        let next = edges
            .get(&node)
            .and_then(|t| t.iter().find(|n| remaining.contains(n)))
            .copied();
        let Some(next) = next else {
            return path;
        };
        if let Some(&pos) = seen.get(&next) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(next);
            return cycle;
        }
        seen.insert(next, path.len());
        path.push(next);
        node = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ReadOp;
    use crate::schema::{FieldSpec, Schema};
    use serde_json::json;

    fn site() -> Arc<ResourceDescriptor> {
        Arc::new(
            ResourceDescriptor::builder(
                "site",
                Schema::new()
                    .field(FieldSpec::str("name").required())
                    .field(FieldSpec::str("parent")),
            )
            .identity(&["name"])
            .depends_on("parent", "site", "name")
            .list(ReadOp::new("/site"))
            .build()
            .unwrap(),
        )
    }

    fn ssid() -> Arc<ResourceDescriptor> {
        Arc::new(
            ResourceDescriptor::builder(
                "ssid",
                Schema::new()
                    .field(FieldSpec::str("name").required())
                    .field(FieldSpec::str("band"))
                    .field(FieldSpec::str("site")),
            )
            .identity(&["name"])
            .depends_on("site", "site", "name")
            .list(ReadOp::new("/ssid"))
            .build()
            .unwrap(),
        )
    }

    fn assess(d: &Arc<ResourceDescriptor>, index: usize, values: Value, current: Option<Value>) -> Assessment {
        let values = values.as_object().cloned().unwrap();
        Assessment {
            identity: d.identity(&values).unwrap(),
            item: NormalizedItem {
                kind: d.kind.clone(),
                index,
                values,
                defaulted: BTreeSet::new(),
            },
            descriptor: Arc::clone(d),
            current: current.and_then(|c| c.as_object().cloned()),
        }
    }

    fn order(plan: &Plan) -> Vec<String> {
        plan.ops
            .iter()
            .map(|op| format!("{} {}", op.kind, op.identity))
            .collect()
    }

    #[test]
    fn test_decisions() {
        let d = ssid();
        let input = PlanInput {
            state: State::Merged,
            items: vec![
                assess(&d, 0, json!({"name": "A", "band": "5G"}), None),
                assess(&d, 1, json!({"name": "B", "band": "5G"}), Some(json!({"name": "B", "band": "5G", "extra": 1}))),
                assess(&d, 2, json!({"name": "C", "band": "6G"}), Some(json!({"name": "C", "band": "5G"}))),
            ],
            ..PlanInput::default()
        };
        let plan = plan(input).unwrap();
        assert_eq!(
            order(&plan),
            vec!["create ssid[name=A]", "noop ssid[name=B]", "update ssid[name=C]"]
        );
        assert_eq!(plan.ops[2].changes[0].to_string(), "band: 5G → 6G");
    }

    #[test]
    fn test_deleted_state() {
        let d = ssid();
        let input = PlanInput {
            state: State::Deleted,
            items: vec![
                assess(&d, 0, json!({"name": "A"}), Some(json!({"name": "A", "id": "1"}))),
                assess(&d, 1, json!({"name": "B"}), None),
            ],
            ..PlanInput::default()
        };
        let plan = plan(input).unwrap();
        assert_eq!(order(&plan), vec!["delete ssid[name=A]", "noop ssid[name=B]"]);
    }

    #[test]
    fn test_creations_before_references() {
        let (s, w) = (site(), ssid());
        let input = PlanInput {
            state: State::Merged,
            items: vec![
                assess(&w, 0, json!({"name": "corp", "site": "Branch"}), None),
                assess(&s, 1, json!({"name": "Branch", "parent": "Global"}), None),
                assess(&s, 2, json!({"name": "Global"}), None),
            ],
            ..PlanInput::default()
        };
        let plan = plan(input).unwrap();
        assert_eq!(
            order(&plan),
            vec!["create site[name=Global]", "create site[name=Branch]", "create ssid[name=corp]"]
        );
        assert_eq!(plan.ops[2].requires.len(), 1);
    }

    #[test]
    fn test_deletions_in_reverse() {
        let (s, w) = (site(), ssid());
        let input = PlanInput {
            state: State::Deleted,
            items: vec![
                assess(&s, 0, json!({"name": "Global"}), Some(json!({"name": "Global"}))),
                assess(&s, 1, json!({"name": "Branch"}), Some(json!({"name": "Branch", "parent": "Global"}))),
                assess(&w, 2, json!({"name": "corp"}), Some(json!({"name": "corp", "site": "Branch"}))),
            ],
            ..PlanInput::default()
        };
        let plan = plan(input).unwrap();
        assert_eq!(
            order(&plan),
            vec!["delete ssid[name=corp]", "delete site[name=Branch]", "delete site[name=Global]"]
        );
    }

    #[test]
    fn test_declaration_order_tie_break() {
        let d = ssid();
        let input = PlanInput {
            state: State::Merged,
            items: (0..5)
                .map(|i| assess(&d, i, json!({"name": format!("n{}", 4 - i)}), None))
                .collect(),
            ..PlanInput::default()
        };
        let plan = plan(input).unwrap();
        let names: Vec<_> = plan.ops.iter().map(|op| op.index.unwrap()).collect();
        assert_eq!(names, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let s = site();
        let input = PlanInput {
            state: State::Merged,
            items: vec![
                assess(&s, 0, json!({"name": "A", "parent": "B"}), None),
                assess(&s, 1, json!({"name": "B", "parent": "A"}), None),
            ],
            ..PlanInput::default()
        };
        let cycle = plan(input).unwrap_err();
        assert_eq!(cycle.members.len(), 3);
        assert_eq!(cycle.members.first(), cycle.members.last());
        assert!(cycle.to_string().contains("site[name=A]"));
    }

    #[test]
    fn test_reference_to_failed_item_is_blocked() {
        let w = ssid();
        let failed = BTreeSet::from([Identity::new("site", vec![("name".to_string(), "Branch".to_string())])]);
        let input = PlanInput {
            state: State::Merged,
            items: vec![assess(&w, 0, json!({"name": "corp", "site": "Branch"}), None)],
            failed,
            ..PlanInput::default()
        };
        let plan = plan(input).unwrap();
        assert!(plan.ops[0].blocked_by.is_some());
    }

    #[test]
    fn test_undeclared_deletes_follow_declared() {
        let d = ssid();
        let input = PlanInput {
            state: State::Replaced,
            items: vec![assess(&d, 0, json!({"name": "keep"}), Some(json!({"name": "keep"})))],
            undeclared: vec![
                Undeclared {
                    identity: Identity::new("ssid", vec![("name".to_string(), "z".to_string())]),
                    descriptor: Arc::clone(&d),
                    current: json!({"name": "z"}).as_object().cloned().unwrap(),
                },
                Undeclared {
                    identity: Identity::new("ssid", vec![("name".to_string(), "b".to_string())]),
                    descriptor: Arc::clone(&d),
                    current: json!({"name": "b"}).as_object().cloned().unwrap(),
                },
            ],
            ..PlanInput::default()
        };
        let plan = plan(input).unwrap();
        assert_eq!(
            order(&plan),
            vec!["noop ssid[name=keep]", "delete ssid[name=b]", "delete ssid[name=z]"]
        );
    }
}
