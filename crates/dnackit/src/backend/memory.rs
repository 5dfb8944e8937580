//! In-process controller simulation.
//!
//! [`MemoryController`] answers the same paths and body shapes as a real
//! controller for a configurable set of collections, issues session tokens,
//! runs mutations through tasks or executions, and records every call. Fault
//! injection covers the failure modes the reconciler has to survive: HTTP
//! errors, dropped connections, expired tokens, stuck or failing tasks, and
//! objects that drift after a successful write.

use crate::backend::Transport;
use crate::error::{Error, Result};
use crate::types::{
    AUTH_PATH, EXECUTION_PATH, Method, RawResponse, Request, TASK_PATH, TOKEN_HEADER,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// How a collection reports the outcome of mutating calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The final object in the response body
    Inline,
    /// `{response: {taskId, url}}`, polled through the task endpoint
    Task,
    /// `{executionId, executionStatusUrl}`, polled through the execution endpoint
    Execution,
}

/// A collection of objects served under one path.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    /// List/create path; items live at `{path}/{id}`
    pub path: String,
    /// Field holding the controller-assigned id
    pub id_field: String,
    /// Query parameter to field mapping honored by list reads
    pub filters: Vec<(String, String)>,
    /// Fields whose values must be unique; a duplicate create gets HTTP 409
    pub unique: Vec<String>,
    pub delivery: Delivery,
    /// Extra paths that list the collection, e.g. paged `{path}/1/500`
    pub list_paths: Vec<String>,
    /// Turns a written object into the layout reads return
    pub store: Option<fn(&Value) -> Value>,
    /// Wraps listed objects; default `{response: [...], version}`
    pub list_body: Option<fn(Vec<Value>) -> Value>,
}

impl CollectionSpec {
    pub fn new(path: impl Into<String>, delivery: Delivery) -> Self {
        Self {
            path: path.into(),
            id_field: "id".to_string(),
            filters: Vec::new(),
            unique: Vec::new(),
            delivery,
            list_paths: Vec::new(),
            store: None,
            list_body: None,
        }
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Honor `?{param}=value` by matching `field`.
    pub fn filter(mut self, param: impl Into<String>, field: impl Into<String>) -> Self {
        self.filters.push((param.into(), field.into()));
        self
    }

    pub fn unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(field.into());
        self
    }

    pub fn list_path(mut self, path: impl Into<String>) -> Self {
        self.list_paths.push(path.into());
        self
    }

    /// Store created objects and update patches as `store` shapes them.
    pub fn store(mut self, store: fn(&Value) -> Value) -> Self {
        self.store = Some(store);
        self
    }

    pub fn list_body(mut self, wrap: fn(Vec<Value>) -> Value) -> Self {
        self.list_body = Some(wrap);
        self
    }
}

/// What an injected fault does to a matching request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Answer with this HTTP status without touching state
    Status(u16),
    /// Fail with a connection error without touching state
    Network,
    /// Apply the request, then fail with a connection error
    ApplyThenDrop,
}

/// How tasks created by mutations behave when polled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskMode {
    /// Complete immediately
    #[default]
    Succeed,
    /// Never reach a terminal state
    Never,
    /// Fail with this reason; the mutation is not applied
    Fail(String),
    /// Report progress for this many polls, then complete
    AfterPolls(u32),
    /// Complete without error but with this progress text
    Progress(String),
    /// Report this progress text without ever setting an end time
    Unfinished(String),
}

/// One request as seen by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug)]
struct Fault {
    method: Method,
    path_contains: String,
    outcome: FaultOutcome,
    remaining: u32,
}

#[derive(Debug)]
struct Drift {
    path: String,
    field: String,
    value: Value,
}

#[derive(Debug)]
struct Collection {
    spec: CollectionSpec,
    items: Vec<Value>,
}

#[derive(Debug)]
struct FakeTask {
    mode: TaskMode,
    polls: u32,
}

#[derive(Debug, Default)]
struct State {
    username: String,
    password: String,
    collections: Vec<Collection>,
    tokens: HashSet<String>,
    token_seq: u64,
    logins: usize,
    calls: Vec<Call>,
    faults: Vec<Fault>,
    task_mode: TaskMode,
    tasks: BTreeMap<String, FakeTask>,
    task_polls: usize,
    drifts: Vec<Drift>,
    id_seq: u64,
}

/// A simulated controller. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryController {
    state: Arc<Mutex<State>>,
}

impl MemoryController {
    /// Create a controller that accepts `username`/`password` at the token endpoint.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let controller = Self::default();
        {
            let mut state = controller.lock();
            state.username = username.into();
            state.password = password.into();
        }
        controller
    }

    /// Serve a collection.
    pub fn with_collection(self, spec: CollectionSpec) -> Self {
        self.lock().collections.push(Collection {
            spec,
            items: Vec::new(),
        });
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add objects to a collection; objects without an id get one.
    pub fn seed(&self, path: &str, items: impl IntoIterator<Item = Value>) {
        let mut state = self.lock();
        let mut next_id = state.id_seq;
        if let Some(collection) = state.collections.iter_mut().find(|c| c.spec.path == path) {
            for mut item in items {
                if let Value::Object(map) = &mut item {
                    let id_field = collection.spec.id_field.clone();
                    map.entry(id_field).or_insert_with(|| {
                        next_id += 1;
                        Value::String(format!("id-{next_id}"))
                    });
                }
                collection.items.push(item);
            }
        }
        state.id_seq = next_id;
    }

    /// Current objects of a collection.
    pub fn items(&self, path: &str) -> Vec<Value> {
        self.lock()
            .collections
            .iter()
            .find(|c| c.spec.path == path)
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }

    /// Inject a fault for the next `times` requests matching method and path fragment.
    pub fn fail_next(
        &self,
        method: Method,
        path_contains: impl Into<String>,
        outcome: FaultOutcome,
        times: u32,
    ) {
        self.lock().faults.push(Fault {
            method,
            path_contains: path_contains.into(),
            outcome,
            remaining: times,
        });
    }

    /// Invalidate every issued token.
    pub fn expire_token(&self) {
        self.lock().tokens.clear();
    }

    /// Behavior of tasks created from now on.
    pub fn set_task_mode(&self, mode: TaskMode) {
        self.lock().task_mode = mode;
    }

    /// After the next successful mutation on `path`, overwrite `field` on the touched object.
    pub fn drift_after_mutation(&self, path: impl Into<String>, field: impl Into<String>, value: Value) {
        self.lock().drifts.push(Drift {
            path: path.into(),
            field: field.into(),
            value,
        });
    }

    /// Every request received, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// POST/PUT/DELETE requests against collections (login excluded).
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method.is_mutating() && c.path != AUTH_PATH)
            .cloned()
            .collect()
    }

    /// Number of successful logins.
    pub fn logins(&self) -> usize {
        self.lock().logins
    }

    /// Number of task and execution status reads.
    pub fn task_polls(&self) -> usize {
        self.lock().task_polls
    }
}

impl Transport for MemoryController {
    fn send(&self, request: &Request) -> Result<RawResponse> {
        let mut state = self.lock();
        state.calls.push(Call {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
        });

        let fault = state.take_fault(request);
        match fault {
            Some(FaultOutcome::Status(status)) => {
                return Ok(RawResponse::new(
                    status,
                    json!({"message": format!("injected status {status}")}),
                ));
            }
            Some(FaultOutcome::Network) => {
                return Err(Error::Network {
                    message: "connection reset by peer".to_string(),
                });
            }
            Some(FaultOutcome::ApplyThenDrop) | None => {}
        }

        let response = state.handle(request);
        if fault == Some(FaultOutcome::ApplyThenDrop) {
            return Err(Error::Network {
                message: "connection closed before response".to_string(),
            });
        }
        Ok(response)
    }
}

fn not_found(what: &str) -> RawResponse {
    RawResponse::new(404, json!({"message": format!("{what} not found")}))
}

fn bad_request(message: impl Into<String>) -> RawResponse {
    RawResponse::new(400, json!({"message": message.into()}))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl State {
    fn take_fault(&mut self, request: &Request) -> Option<FaultOutcome> {
        let index = self.faults.iter().position(|f| {
            f.remaining > 0 && f.method == request.method && request.path.contains(&f.path_contains)
        })?;
        let fault = &mut self.faults[index];
        fault.remaining -= 1;
        let outcome = fault.outcome.clone();
        if fault.remaining == 0 {
            self.faults.remove(index);
        }
        Some(outcome)
    }

    fn handle(&mut self, request: &Request) -> RawResponse {
        if request.path == AUTH_PATH {
            return self.login(request);
        }

        let authorized = request
            .header_value(TOKEN_HEADER)
            .is_some_and(|token| self.tokens.contains(token));
        if !authorized {
            return RawResponse::new(401, json!({"message": "Unauthorized: token invalid or expired"}));
        }

        if let Some(id) = request.path.strip_prefix(&format!("{TASK_PATH}/")) {
            return self.poll_task(id);
        }
        if let Some(id) = request.path.strip_prefix(&format!("{EXECUTION_PATH}/")) {
            return self.poll_execution(id);
        }

        let Some((index, item_id)) = self.route(&request.path) else {
            return not_found(&request.path);
        };

        match (request.method, item_id) {
            (Method::Get, None) => self.list(index, &request.query),
            (Method::Get, Some(id)) => self.get(index, &id),
            (Method::Post, None) => self.mutate(index, request, None),
            (Method::Put, id) => self.mutate(index, request, id),
            (Method::Delete, Some(id)) => self.mutate(index, request, Some(id)),
            _ => RawResponse::new(405, json!({"message": "method not allowed"})),
        }
    }

    fn login(&mut self, request: &Request) -> RawResponse {
        let expected = format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        );
        if request.method != Method::Post || request.header_value("Authorization") != Some(expected.as_str()) {
            return RawResponse::new(401, json!({"error": "Authentication has failed. Please provide valid credentials."}));
        }
        self.token_seq += 1;
        self.logins += 1;
        let token = format!("tok-{}", self.token_seq);
        self.tokens.insert(token.clone());
        RawResponse::new(200, json!({"Token": token}))
    }

    fn route(&self, path: &str) -> Option<(usize, Option<String>)> {
        self.collections
            .iter()
            .enumerate()
            .filter_map(|(index, c)| {
                if path == c.spec.path || c.spec.list_paths.iter().any(|p| p == path) {
                    Some((index, None))
                } else {
                    path.strip_prefix(&c.spec.path)
                        .and_then(|rest| rest.strip_prefix('/'))
                        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                        .map(|id| (index, Some(id.to_string())))
                }
            })
            .max_by_key(|(index, _)| self.collections[*index].spec.path.len())
    }

    fn list(&self, index: usize, query: &[(String, String)]) -> RawResponse {
        let collection = &self.collections[index];
        let items: Vec<Value> = collection
            .items
            .iter()
            .filter(|item| {
                query.iter().all(|(param, wanted)| {
                    match collection.spec.filters.iter().find(|(p, _)| p == param) {
                        Some((_, field)) => item.get(field).is_some_and(|v| text_of(v) == *wanted),
                        None => true,
                    }
                })
            })
            .cloned()
            .collect();
        let body = match collection.spec.list_body {
            Some(wrap) => wrap(items),
            None => json!({"response": items, "version": "1.0"}),
        };
        RawResponse::new(200, body)
    }

    fn get(&self, index: usize, id: &str) -> RawResponse {
        let collection = &self.collections[index];
        match collection.find(id) {
            Some(pos) => RawResponse::new(200, json!({"response": collection.items[pos]})),
            None => not_found(id),
        }
    }

    fn mutate(&mut self, index: usize, request: &Request, item_id: Option<String>) -> RawResponse {
        let mode = self.task_mode.clone();
        let delivery = self.collections[index].spec.delivery;
        let apply = !(matches!(mode, TaskMode::Fail(_)) && delivery != Delivery::Inline);

        let touched = if apply {
            let result = match request.method {
                Method::Post => self.create(index, request.body.as_ref()),
                Method::Put => self.update(index, request.body.as_ref(), item_id.as_deref()),
                Method::Delete => self.delete(index, item_id.as_deref().unwrap_or_default()),
                Method::Get => Ok(Value::Null),
            };
            match result {
                Ok(touched) => touched,
                Err(response) => return response,
            }
        } else {
            Value::Null
        };

        if apply {
            self.apply_drift(index, &touched);
        }

        match delivery {
            Delivery::Inline => RawResponse::new(200, json!({"response": touched})),
            Delivery::Task => {
                let id = self.spawn_task("task", mode);
                RawResponse::new(
                    202,
                    json!({"response": {"taskId": id, "url": format!("/api/v1/task/{id}")}, "version": "1.0"}),
                )
            }
            Delivery::Execution => {
                let id = self.spawn_task("exec", mode);
                RawResponse::new(
                    202,
                    json!({
                        "executionId": id,
                        "executionStatusUrl": format!("{EXECUTION_PATH}/{id}"),
                        "message": "The request has been accepted for execution",
                    }),
                )
            }
        }
    }

    fn create(&mut self, index: usize, body: Option<&Value>) -> std::result::Result<Value, RawResponse> {
        let objects: Vec<Value> = match body {
            Some(Value::Array(items)) => items.clone(),
            Some(object @ Value::Object(_)) => vec![object.clone()],
            _ => return Err(bad_request("request body must be an object or an array")),
        };

        let mut created = Vec::new();
        for object in objects {
            let collection = &self.collections[index];
            let stored = match collection.spec.store {
                Some(store) => store(&object),
                None => object,
            };
            let Value::Object(mut map) = stored else {
                return Err(bad_request("array elements must be objects"));
            };
            for field in &collection.spec.unique {
                if let Some(value) = map.get(field) {
                    if collection.items.iter().any(|i| i.get(field) == Some(value)) {
                        return Err(RawResponse::new(
                            409,
                            json!({"message": format!("object with {field}={} already exists", text_of(value))}),
                        ));
                    }
                }
            }
            let id_field = collection.spec.id_field.clone();
            if !map.contains_key(&id_field) {
                self.id_seq += 1;
                map.insert(id_field, Value::String(format!("id-{}", self.id_seq)));
            }
            let item = Value::Object(map);
            self.collections[index].items.push(item.clone());
            created.push(item);
        }

        Ok(if created.len() == 1 {
            created.remove(0)
        } else {
            Value::Array(created)
        })
    }

    fn update(
        &mut self,
        index: usize,
        body: Option<&Value>,
        path_id: Option<&str>,
    ) -> std::result::Result<Value, RawResponse> {
        let patch = match body {
            Some(Value::Array(items)) if items.len() == 1 => items[0].clone(),
            Some(object @ Value::Object(_)) => object.clone(),
            _ => return Err(bad_request("update body must be a single object")),
        };
        let collection = &mut self.collections[index];
        let id = path_id
            .map(str::to_string)
            .or_else(|| patch.get(&collection.spec.id_field).map(text_of))
            .ok_or_else(|| bad_request("update requires an id"))?;
        let pos = collection.find(&id).ok_or_else(|| not_found(&id))?;
        let patch = match collection.spec.store {
            Some(store) => store(&patch),
            None => patch,
        };

        if let (Value::Object(target), Value::Object(fields)) = (&mut collection.items[pos], patch) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        Ok(collection.items[pos].clone())
    }

    fn delete(&mut self, index: usize, id: &str) -> std::result::Result<Value, RawResponse> {
        let collection = &mut self.collections[index];
        let pos = collection.find(id).ok_or_else(|| not_found(id))?;
        Ok(collection.items.remove(pos))
    }

    fn apply_drift(&mut self, index: usize, touched: &Value) {
        let path = self.collections[index].spec.path.clone();
        let Some(pos) = self.drifts.iter().position(|d| d.path == path) else {
            return;
        };
        let collection = &mut self.collections[index];
        let Some(id) = touched.get(&collection.spec.id_field).map(text_of) else {
            return;
        };
        let drift = self.drifts.remove(pos);
        if let Some(item_pos) = collection.find(&id) {
            if let Value::Object(map) = &mut collection.items[item_pos] {
                map.insert(drift.field, drift.value);
            }
        }
    }

    fn spawn_task(&mut self, prefix: &str, mode: TaskMode) -> String {
        self.id_seq += 1;
        let id = format!("{prefix}-{}", self.id_seq);
        self.tasks.insert(id.clone(), FakeTask { mode, polls: 0 });
        id
    }

    /// Advance a task by one poll and report (finished, failure reason, progress).
    fn advance(&mut self, id: &str) -> Option<(bool, Option<String>, String)> {
        self.task_polls += 1;
        let task = self.tasks.get_mut(id)?;
        task.polls += 1;
        Some(match &task.mode {
            TaskMode::Succeed => (true, None, "Task completed successfully".to_string()),
            TaskMode::Never => (false, None, "In progress".to_string()),
            TaskMode::Fail(reason) => (true, Some(reason.clone()), "Task failed".to_string()),
            TaskMode::AfterPolls(n) if task.polls > *n => {
                (true, None, "Task completed successfully".to_string())
            }
            TaskMode::AfterPolls(_) => (false, None, "In progress".to_string()),
            TaskMode::Progress(text) => (true, None, text.clone()),
            TaskMode::Unfinished(text) => (false, None, text.clone()),
        })
    }

    fn poll_task(&mut self, id: &str) -> RawResponse {
        let Some((done, failure, progress)) = self.advance(id) else {
            return not_found(id);
        };
        let mut record = Map::new();
        record.insert("id".into(), json!(id));
        record.insert("isError".into(), json!(failure.is_some()));
        record.insert("progress".into(), json!(progress));
        if let Some(reason) = failure {
            record.insert("failureReason".into(), json!(reason));
        }
        if done {
            record.insert("endTime".into(), json!(1_700_000_000_000_u64));
        }
        RawResponse::new(200, json!({"response": record, "version": "1.0"}))
    }

    fn poll_execution(&mut self, id: &str) -> RawResponse {
        let Some((done, failure, _)) = self.advance(id) else {
            return not_found(id);
        };
        let status = match (done, &failure) {
            (_, Some(_)) => "FAILURE",
            (true, None) => "SUCCESS",
            (false, None) => "IN_PROGRESS",
        };
        RawResponse::new(
            200,
            json!({"executionId": id, "status": status, "bapiError": failure}),
        )
    }
}

impl Collection {
    fn find(&self, id: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.get(&self.spec.id_field).map(text_of).as_deref() == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = "/dna/system/api/v1/user";

    fn controller() -> MemoryController {
        MemoryController::new("admin", "pw").with_collection(
            CollectionSpec::new(USERS, Delivery::Inline)
                .id_field("userId")
                .filter("username", "username")
                .unique("username"),
        )
    }

    fn token(controller: &MemoryController) -> String {
        let auth = format!("Basic {}", STANDARD.encode("admin:pw"));
        let response = controller
            .send(&Request::new(Method::Post, AUTH_PATH).header("Authorization", auth))
            .unwrap();
        response.body["Token"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_login_and_token_check() {
        let controller = controller();
        let bad = controller
            .send(&Request::new(Method::Post, AUTH_PATH).header("Authorization", "Basic eA=="))
            .unwrap();
        assert_eq!(bad.status, 401);

        let token = token(&controller);
        assert_eq!(controller.logins(), 1);

        let unauthenticated = controller.send(&Request::get(USERS)).unwrap();
        assert_eq!(unauthenticated.status, 401);

        let ok = controller.send(&Request::get(USERS).header(TOKEN_HEADER, &token)).unwrap();
        assert_eq!(ok.status, 200);

        controller.expire_token();
        let expired = controller.send(&Request::get(USERS).header(TOKEN_HEADER, &token)).unwrap();
        assert_eq!(expired.status, 401);
    }

    #[test]
    fn test_crud_and_filters() {
        let controller = controller();
        let token = token(&controller);
        let send = |r: Request| controller.send(&r.header(TOKEN_HEADER, &token)).unwrap();

        let created = send(Request::new(Method::Post, USERS).json(json!({"username": "alice", "email": "a@x"})));
        let id = created.body["response"]["userId"].as_str().unwrap().to_string();

        let dup = send(Request::new(Method::Post, USERS).json(json!({"username": "alice"})));
        assert_eq!(dup.status, 409);

        let listed = send(Request::get(USERS).query("username", "alice"));
        assert_eq!(listed.body["response"].as_array().unwrap().len(), 1);
        let none = send(Request::get(USERS).query("username", "bob"));
        assert!(none.body["response"].as_array().unwrap().is_empty());

        let updated = send(Request::new(Method::Put, USERS).json(json!({"userId": id, "email": "b@x"})));
        assert_eq!(updated.body["response"]["email"], "b@x");
        assert_eq!(updated.body["response"]["username"], "alice");

        let deleted = send(Request::new(Method::Delete, format!("{USERS}/{id}")));
        assert_eq!(deleted.status, 200);
        assert!(controller.items(USERS).is_empty());

        let missing = send(Request::new(Method::Delete, format!("{USERS}/{id}")));
        assert_eq!(missing.status, 404);
        assert_eq!(controller.mutating_calls().len(), 5);
    }

    #[test]
    fn test_faults() {
        let controller = controller();
        let token = token(&controller);
        controller.fail_next(Method::Get, USERS, FaultOutcome::Status(503), 1);

        let first = controller.send(&Request::get(USERS).header(TOKEN_HEADER, &token)).unwrap();
        assert_eq!(first.status, 503);
        let second = controller.send(&Request::get(USERS).header(TOKEN_HEADER, &token)).unwrap();
        assert_eq!(second.status, 200);

        controller.fail_next(Method::Post, USERS, FaultOutcome::ApplyThenDrop, 1);
        let dropped = controller.send(
            &Request::new(Method::Post, USERS)
                .header(TOKEN_HEADER, &token)
                .json(json!({"username": "carol"})),
        );
        assert!(dropped.is_err());
        assert_eq!(controller.items(USERS).len(), 1);
    }

    #[test]
    fn test_task_modes() {
        let sites = "/dna/intent/api/v1/site";
        let controller = MemoryController::new("admin", "pw")
            .with_collection(CollectionSpec::new(sites, Delivery::Execution));
        let token = token(&controller);

        controller.set_task_mode(TaskMode::AfterPolls(1));
        let accepted = controller
            .send(&Request::new(Method::Post, sites).header(TOKEN_HEADER, &token).json(json!({"name": "HQ"})))
            .unwrap();
        let id = accepted.body["executionId"].as_str().unwrap().to_string();
        let poll = |controller: &MemoryController| {
            controller
                .send(&Request::get(format!("{EXECUTION_PATH}/{id}")).header(TOKEN_HEADER, &token))
                .unwrap()
                .body["status"]
                .clone()
        };
        assert_eq!(poll(&controller), "IN_PROGRESS");
        assert_eq!(poll(&controller), "SUCCESS");
        assert_eq!(controller.task_polls(), 2);

        controller.set_task_mode(TaskMode::Fail("bad parent".to_string()));
        controller
            .send(&Request::new(Method::Post, sites).header(TOKEN_HEADER, &token).json(json!({"name": "Branch"})))
            .unwrap();
        assert_eq!(controller.items(sites).len(), 1);
    }

    #[test]
    fn test_reshaped_collection() {
        let ssids = "/dna/intent/api/v1/enterprise-ssid";
        let controller = MemoryController::new("admin", "pw").with_collection(
            CollectionSpec::new(ssids, Delivery::Task)
                .id_field("name")
                .list_path(format!("{ssids}/all"))
                .store(|object| json!({"name": object["ssidName"], "level": object["level"]}))
                .list_body(|items| json!([{"ssidDetails": items}])),
        );
        let token = token(&controller);
        let send = |r: Request| controller.send(&r.header(TOKEN_HEADER, &token)).unwrap();

        send(Request::new(Method::Post, ssids).json(json!({"ssidName": "corp", "level": "WPA2"})));
        assert_eq!(controller.items(ssids), vec![json!({"name": "corp", "level": "WPA2"})]);

        let listed = send(Request::get(format!("{ssids}/all")));
        assert_eq!(listed.body, json!([{"ssidDetails": [{"name": "corp", "level": "WPA2"}]}]));

        send(Request::new(Method::Put, format!("{ssids}/corp")).json(json!({"ssidName": "corp", "level": "WPA3"})));
        assert_eq!(controller.items(ssids)[0]["level"], "WPA3");
    }

    #[test]
    fn test_drift_after_mutation() {
        let controller = controller();
        let token = token(&controller);
        controller.drift_after_mutation(USERS, "email", json!("drifted@x"));
        controller
            .send(&Request::new(Method::Post, USERS).header(TOKEN_HEADER, &token).json(json!({"username": "dave", "email": "d@x"})))
            .unwrap();
        assert_eq!(controller.items(USERS)[0]["email"], "drifted@x");
    }
}
