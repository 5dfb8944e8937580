//! Core types for controller API access.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

/// Token endpoint (HTTP Basic in, `{"Token": ...}` out).
pub const AUTH_PATH: &str = "/dna/system/api/v1/auth/token";

/// Task status endpoint prefix; the task id is appended.
pub const TASK_PATH: &str = "/dna/intent/api/v1/task";

/// Business-API execution status endpoint prefix; the execution id is appended.
pub const EXECUTION_PATH: &str = "/dna/platform/management/business-api/v1/execution-status";

/// Header carrying the session token on every request after login.
pub const TOKEN_HEADER: &str = "X-Auth-Token";

/// Progress text that marks a task as failed even when `isError` is not set.
pub const DEFAULT_FAILURE_PATTERN: &str = r"(?i)\b(fail(ed|ure)?|error)\b";

static DEFAULT_FAILURE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_FAILURE_PATTERN).expect("default failure pattern"));

/// Controller connection and login details.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Controller host name or address, optionally with a scheme
    pub host: String,
    /// HTTPS port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    pub username: String,
    /// Login password (never serialized, never printed)
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Verify the controller's TLS certificate
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    /// Controller API version the playbooks target
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_port() -> u16 {
    443
}

fn default_verify_tls() -> bool {
    true
}

fn default_api_version() -> String {
    "2.3.7.6".to_string()
}

impl Credentials {
    /// Create credentials with default port, TLS verification on, and default API version.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: password.into(),
            verify_tls: default_verify_tls(),
            api_version: default_api_version(),
        }
    }

    /// Base URL for every request (`https://host[:port]`).
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            return host.to_string();
        }
        if self.port == 443 {
            format!("https://{host}")
        } else {
            format!("https://{host}:{}", self.port)
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"********")
            .field("verify_tls", &self.verify_tls)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Options for building a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Hard per-request timeout
    pub request_timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryConfig,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            user_agent: "dnackit-rs".to_string(),
        }
    }
}

/// How long and how often to poll an async task.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Give up after this long
    pub timeout: Duration,
    /// Pause between polls
    pub interval: Duration,
    /// Progress text that marks failure
    pub failure_pattern: Regex,
    /// Progress text that marks success even without `endTime`
    pub success_pattern: Option<Regex>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(20 * 60), Duration::from_secs(2))
    }
}

impl PollPolicy {
    /// Create a policy with the default failure pattern.
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            failure_pattern: DEFAULT_FAILURE_REGEX.clone(),
            success_pattern: None,
        }
    }

    /// Treat progress text matching `pattern` as success.
    pub fn with_success_pattern(mut self, pattern: Regex) -> Self {
        self.success_pattern = Some(pattern);
        self
    }
}

/// HTTP method of a controller request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Whether the method changes controller state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request handed to a [`Transport`](crate::backend::Transport).
#[derive(Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the controller base URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    /// Create a request without query, headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header, replacing any header of the same name.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.headers.push((key, value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Value of a header, case-insensitively.
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for Request {
    // Header values carry credentials and bodies may carry secrets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &headers)
            .field("body", &self.body.as_ref().map(|_| "<json>"))
            .finish()
    }
}

/// A raw controller response: status plus parsed JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed body; `Null` when empty, a JSON string when the body was not JSON
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Check if the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Which status endpoint a handle is polled through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    /// `/task/{id}` with `{isError, progress, endTime, failureReason}`
    Task,
    /// `/execution-status/{id}` with `{status, bapiError, endTime}`
    Execution,
}

/// Reference to an async controller-side operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub kind: HandleKind,
    /// Status URL as reported by the controller, informational only
    pub url: Option<String>,
}

impl TaskHandle {
    pub fn task(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: HandleKind::Task,
            url: None,
        }
    }

    pub fn execution(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: HandleKind::Execution,
            url: None,
        }
    }

    /// Path polled for this handle's status.
    pub fn poll_path(&self) -> String {
        match self.kind {
            HandleKind::Task => format!("{TASK_PATH}/{}", self.id),
            HandleKind::Execution => format!("{EXECUTION_PATH}/{}", self.id),
        }
    }
}

/// Body of a mutating call: the final object inline, or a handle to poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Inline(Value),
    Task(TaskHandle),
}

impl ApiResponse {
    /// Interpret a mutating call's body.
    ///
    /// Recognizes `{response: {taskId, url}}`, a bare `{taskId, url}`, and
    /// `{executionId, executionStatusUrl}`; everything else is inline.
    pub fn from_body(body: Value) -> Self {
        let field = |scope: &Value, key: &str| {
            scope.get(key).and_then(Value::as_str).map(str::to_string)
        };

        let scopes = [body.get("response"), Some(&body)];
        for scope in scopes.into_iter().flatten() {
            if let Some(id) = field(scope, "taskId") {
                return Self::Task(TaskHandle {
                    id,
                    kind: HandleKind::Task,
                    url: field(scope, "url"),
                });
            }
            if let Some(id) = field(scope, "executionId") {
                return Self::Task(TaskHandle {
                    id,
                    kind: HandleKind::Execution,
                    url: field(scope, "executionStatusUrl"),
                });
            }
        }
        Self::Inline(body)
    }

    /// The handle, if this is an async response.
    pub fn handle(&self) -> Option<&TaskHandle> {
        match self {
            Self::Task(handle) => Some(handle),
            Self::Inline(_) => None,
        }
    }
}

/// Normalized view of a task or execution status record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub is_error: bool,
    pub progress: String,
    pub end_time: Option<String>,
    pub failure_reason: Option<String>,
    pub data: Option<String>,
}

impl TaskRecord {
    /// Parse a status body for a handle of the given kind.
    pub fn from_body(handle: &TaskHandle, body: &Value) -> Result<Self> {
        match handle.kind {
            HandleKind::Task => Self::from_task_body(&handle.id, body),
            HandleKind::Execution => Self::from_execution_body(&handle.id, body),
        }
    }

    fn from_task_body(id: &str, body: &Value) -> Result<Self> {
        let record = body.get("response").unwrap_or(body);
        if !record.is_object() {
            return Err(Error::InvalidResponse(format!(
                "task {id}: expected an object, got {record}"
            )));
        }

        Ok(Self {
            id: id.to_string(),
            is_error: record
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            progress: text(record.get("progress")).unwrap_or_default(),
            end_time: text(record.get("endTime")),
            failure_reason: text(record.get("failureReason")),
            data: text(record.get("data")),
        })
    }

    fn from_execution_body(id: &str, body: &Value) -> Result<Self> {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::InvalidResponse(format!("execution {id}: missing status field"))
            })?
            .to_ascii_uppercase();

        let terminal = matches!(status.as_str(), "SUCCESS" | "FAILURE");
        let failure_reason = body
            .get("bapiError")
            .and_then(|e| text(Some(e)))
            .filter(|s| !s.is_empty());

        Ok(Self {
            id: id.to_string(),
            is_error: status == "FAILURE",
            end_time: text(body.get("endTime")).or(terminal.then(|| status.clone())),
            progress: status,
            failure_reason,
            data: None,
        })
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Terminal state of a polled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Success(TaskRecord),
    Failure {
        reason: String,
        record: Option<TaskRecord>,
    },
    DeadlineExceeded {
        elapsed: Duration,
    },
    Cancelled,
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retry_config_delay() {
        let config = RetryConfig::new(5, Duration::from_secs(1), 2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("dnac.example.com", "admin", "s3cret!");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("s3cret!"));
        assert!(debug.contains("********"));
    }

    #[test]
    fn test_credentials_base_url() {
        let mut creds = Credentials::new("dnac.example.com", "admin", "pw");
        assert_eq!(creds.base_url(), "https://dnac.example.com");
        creds.port = 8443;
        assert_eq!(creds.base_url(), "https://dnac.example.com:8443");
        creds.host = "http://127.0.0.1:9000/".to_string();
        assert_eq!(creds.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_credentials_deserialize_defaults() {
        let creds: Credentials =
            serde_json::from_value(json!({"host": "h", "username": "u", "password": "p"}))
                .unwrap();
        assert_eq!(creds.port, 443);
        assert!(creds.verify_tls);
        assert_eq!(creds.password, "p");
        let back = serde_json::to_value(&creds).unwrap();
        assert!(back.get("password").is_none());
    }

    #[test]
    fn test_api_response_task_shapes() {
        let nested = ApiResponse::from_body(json!({"response": {"taskId": "t-1", "url": "/api/v1/task/t-1"}}));
        assert_eq!(nested.handle().map(|h| h.id.as_str()), Some("t-1"));

        let bare = ApiResponse::from_body(json!({"taskId": "t-2"}));
        assert_eq!(bare.handle().map(|h| h.kind), Some(HandleKind::Task));

        let execution = ApiResponse::from_body(json!({"executionId": "e-1", "executionStatusUrl": "/x/e-1"}));
        let handle = execution.handle().unwrap();
        assert_eq!(handle.kind, HandleKind::Execution);
        assert_eq!(handle.poll_path(), format!("{EXECUTION_PATH}/e-1"));

        let inline = ApiResponse::from_body(json!({"response": {"id": "u-1"}}));
        assert!(inline.handle().is_none());
    }

    #[test]
    fn test_task_record_from_task_body() {
        let handle = TaskHandle::task("t-1");
        let record = TaskRecord::from_body(
            &handle,
            &json!({"response": {"isError": false, "progress": "done", "endTime": 1700000000000_u64}}),
        )
        .unwrap();
        assert!(!record.is_error);
        assert_eq!(record.end_time.as_deref(), Some("1700000000000"));
    }

    #[test]
    fn test_task_record_from_execution_body() {
        let handle = TaskHandle::execution("e-1");
        let running = TaskRecord::from_body(&handle, &json!({"status": "IN_PROGRESS"})).unwrap();
        assert!(running.end_time.is_none());

        let failed = TaskRecord::from_body(
            &handle,
            &json!({"status": "FAILURE", "bapiError": "site exists"}),
        )
        .unwrap();
        assert!(failed.is_error);
        assert_eq!(failed.failure_reason.as_deref(), Some("site exists"));

        assert!(TaskRecord::from_body(&handle, &json!({})).is_err());
    }

    #[test]
    fn test_request_debug_hides_headers() {
        let request = Request::get("/x").header(TOKEN_HEADER, "secret-token");
        assert!(!format!("{request:?}").contains("secret-token"));
        assert_eq!(request.header_value("x-auth-token"), Some("secret-token"));
    }
}
