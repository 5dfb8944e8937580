//! Session-aware controller client.

use crate::backend::Transport;
use crate::backend::http::HttpTransport;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::retry::{LogCallback, with_retry, with_retry_hook};
use crate::task::{self, TaskSource};
use crate::types::{
    AUTH_PATH, ApiResponse, ClientOptions, Credentials, Method, PollPolicy, RawResponse, Request,
    TOKEN_HEADER, TaskHandle, TaskRecord, TerminalStatus,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Session {
    token: Option<String>,
    logins: u32,
}

/// High-level client for controller operations.
///
/// The client owns the session token: it logs in lazily, attaches the token
/// to every request, and on an HTTP 401 logs in again exactly once before
/// retrying that request. Transient failures are retried per
/// [`ClientOptions::retry`].
pub struct Client {
    transport: Box<dyn Transport>,
    credentials: Credentials,
    options: ClientOptions,
    session: Mutex<Session>,
    cancel: CancelToken,
}

impl Client {
    /// Create a client that talks HTTPS to the controller.
    pub fn new(credentials: Credentials, options: ClientOptions) -> Self {
        let transport = HttpTransport::new(&credentials, &options);
        Self::with_transport(transport, credentials, options)
    }

    /// Create a client with a custom transport (useful for testing).
    pub fn with_transport(
        transport: impl Transport + 'static,
        credentials: Credentials,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            credentials,
            options,
            session: Mutex::new(Session::default()),
            cancel: CancelToken::new(),
        }
    }

    /// Share a cancellation token with the caller.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful logins so far.
    pub fn logins(&self) -> u32 {
        self.session().logins
    }

    /// Log in and store a fresh token.
    pub fn login(&self) -> Result<()> {
        self.refresh_token().map(|_| ())
    }

    fn refresh_token(&self) -> Result<String> {
        let token = with_retry(&self.options.retry, &self.cancel, Some(&LogCallback), || {
            self.authenticate()
        })?;
        let mut session = self.session();
        session.token = Some(token.clone());
        session.logins += 1;
        log::debug!("logged in to {} as {}", self.credentials.host, self.credentials.username);
        Ok(token)
    }

    fn authenticate(&self) -> Result<String> {
        let basic = STANDARD.encode(format!(
            "{}:{}",
            self.credentials.username, self.credentials.password
        ));
        let request = Request::new(Method::Post, AUTH_PATH)
            .header("Authorization", format!("Basic {basic}"))
            .header("Content-Type", "application/json");
        let response = self.transport.send(&request)?;

        match response.status {
            200..=299 => response
                .body
                .get("Token")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Auth {
                    message: "token endpoint answered without a token".to_string(),
                }),
            401 | 403 => Err(Error::Auth {
                message: format!("controller refused credentials for {}", self.credentials.username),
            }),
            status => Err(Error::from_response(status, &response.body)),
        }
    }

    fn current_token(&self) -> Result<String> {
        let cached = self.session().token.clone();
        match cached {
            Some(token) => Ok(token),
            None => self.refresh_token(),
        }
    }

    /// Send one request with the session token, re-authenticating once on 401.
    fn execute(&self, request: &Request) -> Result<RawResponse> {
        let token = self.current_token()?;
        let response = self
            .transport
            .send(&request.clone().header(TOKEN_HEADER, token))?;
        if response.status != 401 {
            return check(response);
        }

        log::info!("session token rejected, logging in again");
        self.session().token = None;
        let token = self.refresh_token()?;
        let response = self
            .transport
            .send(&request.clone().header(TOKEN_HEADER, token))?;
        if response.status == 401 {
            return Err(Error::Auth {
                message: format!(
                    "{} {} refused a freshly issued token",
                    request.method, request.path
                ),
            });
        }
        check(response)
    }

    /// GET `path` and return the response body.
    pub fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let mut request = Request::get(path);
        request.query = query.to_vec();
        with_retry(&self.options.retry, &self.cancel, Some(&LogCallback), || {
            self.execute(&request)
        })
        .map(|r| r.body)
    }

    /// Send a mutating request and interpret its body.
    ///
    /// Transient failures are retried, so only use this for requests that
    /// are safe to repeat. Creates go through [`Client::create_guarded`].
    pub fn submit(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        let request = build(method, path, query, body);
        with_retry(&self.options.retry, &self.cancel, Some(&LogCallback), || {
            self.execute(&request)
        })
        .map(|r| ApiResponse::from_body(r.body))
    }

    /// POST a create, probing before every retry whether the object exists.
    ///
    /// If `probe` finds the object, the earlier attempt landed and its
    /// result is returned inline instead of posting again.
    pub fn create_guarded<P>(
        &self,
        path: &str,
        query: &[(String, String)],
        body: Value,
        mut probe: P,
    ) -> Result<ApiResponse>
    where
        P: FnMut() -> Result<Option<Value>>,
    {
        let request = build(Method::Post, path, query, Some(body));
        with_retry_hook(
            &self.options.retry,
            &self.cancel,
            Some(&LogCallback),
            || {
                let found = probe()?;
                if found.is_some() {
                    log::info!("create on {path} already landed, not repeating it");
                }
                Ok(found.map(ApiResponse::Inline))
            },
            || self.execute(&request).map(|r| ApiResponse::from_body(r.body)),
        )
    }

    /// Read the current status of an async task.
    pub fn read_task(&self, handle: &TaskHandle) -> Result<TaskRecord> {
        let body = self.get(&handle.poll_path(), &[])?;
        TaskRecord::from_body(handle, &body)
    }

    /// Poll a task to its terminal state.
    pub fn await_task(&self, handle: &TaskHandle, policy: &PollPolicy) -> Result<TerminalStatus> {
        task::await_task(self, handle, policy, &self.cancel)
    }
}

impl TaskSource for Client {
    fn read_task(&self, handle: &TaskHandle) -> Result<TaskRecord> {
        Client::read_task(self, handle)
    }
}

fn build(method: Method, path: &str, query: &[(String, String)], body: Option<Value>) -> Request {
    let mut request = Request::new(method, path);
    request.query = query.to_vec();
    if let Some(body) = body {
        request = request
            .header("Content-Type", "application/json")
            .json(body);
    }
    request
}

fn check(response: RawResponse) -> Result<RawResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(Error::from_response(response.status, &response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{CollectionSpec, Delivery, FaultOutcome, MemoryController, TaskMode};
    use crate::error::ErrorCategory;
    use crate::types::RetryConfig;
    use serde_json::json;
    use std::time::Duration;

    const SSIDS: &str = "/dna/intent/api/v1/enterprise-ssid";

    fn setup() -> (MemoryController, Client) {
        let controller = MemoryController::new("admin", "pw")
            .with_collection(CollectionSpec::new(SSIDS, Delivery::Task).filter("ssidName", "ssidName"));
        let options = ClientOptions {
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                backoff_factor: 1.0,
                max_delay: Duration::from_millis(5),
            },
            ..ClientOptions::default()
        };
        let client = Client::with_transport(
            controller.clone(),
            Credentials::new("controller.test", "admin", "pw"),
            options,
        );
        (controller, client)
    }

    #[test]
    fn test_lazy_login() {
        let (controller, client) = setup();
        assert_eq!(client.logins(), 0);
        client.get(SSIDS, &[]).unwrap();
        client.get(SSIDS, &[]).unwrap();
        assert_eq!(client.logins(), 1);
        assert_eq!(controller.logins(), 1);
    }

    #[test]
    fn test_bad_credentials() {
        let controller = MemoryController::new("admin", "pw");
        let client = Client::with_transport(
            controller,
            Credentials::new("controller.test", "admin", "wrong"),
            ClientOptions::default(),
        );
        let err = client.login().unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(err.category(), ErrorCategory::Upstream);
    }

    #[test]
    fn test_reauth_once_on_expired_token() {
        let (controller, client) = setup();
        client.login().unwrap();
        controller.expire_token();

        client.get(SSIDS, &[]).unwrap();
        assert_eq!(client.logins(), 2);
    }

    #[test]
    fn test_second_401_is_auth_failure() {
        let (controller, client) = setup();
        client.login().unwrap();
        controller.fail_next(Method::Get, SSIDS, FaultOutcome::Status(401), 2);

        let err = client.get(SSIDS, &[]).unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(client.logins(), 2);
    }

    #[test]
    fn test_transient_retry() {
        let (controller, client) = setup();
        controller.fail_next(Method::Get, SSIDS, FaultOutcome::Status(503), 2);
        client.get(SSIDS, &[]).unwrap();

        controller.fail_next(Method::Get, SSIDS, FaultOutcome::Status(503), 3);
        let err = client.get(SSIDS, &[]).unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { .. }));
    }

    #[test]
    fn test_submit_returns_task_handle() {
        let (controller, client) = setup();
        let response = client
            .submit(Method::Post, SSIDS, &[], Some(json!({"ssidName": "corp"})))
            .unwrap();
        let handle = response.handle().unwrap();
        let status = client
            .await_task(handle, &PollPolicy::new(Duration::from_secs(1), Duration::from_millis(1)))
            .unwrap();
        assert!(status.is_success());
        assert_eq!(controller.items(SSIDS).len(), 1);
    }

    #[test]
    fn test_task_failure_reason() {
        let (controller, client) = setup();
        controller.set_task_mode(TaskMode::Fail("NCWL10005: invalid passphrase".to_string()));
        let response = client
            .submit(Method::Post, SSIDS, &[], Some(json!({"ssidName": "corp"})))
            .unwrap();
        let status = client
            .await_task(response.handle().unwrap(), &PollPolicy::default())
            .unwrap();
        match status {
            TerminalStatus::Failure { reason, .. } => assert!(reason.contains("NCWL10005")),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_create_guarded_does_not_duplicate() {
        let (controller, client) = setup();
        controller.fail_next(Method::Post, SSIDS, FaultOutcome::ApplyThenDrop, 1);

        let probe_client = &client;
        let response = client
            .create_guarded(SSIDS, &[], json!({"ssidName": "corp"}), || {
                let body = probe_client.get(SSIDS, &[("ssidName".to_string(), "corp".to_string())])?;
                Ok(body["response"].as_array().and_then(|a| a.first()).cloned())
            })
            .unwrap();

        assert!(matches!(response, ApiResponse::Inline(_)));
        assert_eq!(controller.items(SSIDS).len(), 1);
        let posts = controller
            .mutating_calls()
            .into_iter()
            .filter(|c| c.method == Method::Post)
            .count();
        assert_eq!(posts, 1);
    }
}
