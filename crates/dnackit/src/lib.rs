//! # dnackit
//!
//! Pure Rust client for the Catalyst Center (DNA Center) REST API.
//!
//! This crate provides functionality for:
//! - Token login and transparent re-authentication on expiry
//! - Retrying transient failures with exponential backoff
//! - Recognizing task and execution handles in mutating responses
//! - Polling async tasks to a terminal state with a deadline
//! - Simulating a controller in-process for tests
//!
//! ## Example
//!
//! ```no_run
//! use dnackit::{Client, ClientOptions, Credentials, Method, PollPolicy};
//! use serde_json::json;
//!
//! let credentials = Credentials::new("dnac.example.com", "admin", "secret");
//! let client = Client::new(credentials, ClientOptions::default());
//!
//! let sites = client.get("/dna/intent/api/v1/site", &[]).expect("read failed");
//! println!("{sites}");
//!
//! let response = client
//!     .submit(Method::Post, "/dna/intent/api/v1/site", &[], Some(json!({"type": "area"})))
//!     .expect("create failed");
//! if let Some(handle) = response.handle() {
//!     let status = client.await_task(handle, &PollPolicy::default()).expect("poll failed");
//!     println!("finished: {}", status.is_success());
//! }
//! ```
//!
//! ## Retry Logic
//!
//! Network errors, timeouts, HTTP 429 and 5xx responses are retried with
//! exponential backoff. Configure retry behavior with [`RetryConfig`].

#![warn(clippy::all)]

pub mod backend;
pub mod cancel;
pub mod client;
pub mod error;
pub mod retry;
pub mod task;
pub mod types;

pub use cancel::CancelToken;
pub use client::Client;
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    ApiResponse, ClientOptions, Credentials, HandleKind, Method, PollPolicy, RawResponse, Request,
    RetryConfig, TaskHandle, TaskRecord, TerminalStatus,
};
