//! Transport abstraction for controller requests.
//!
//! The [`Transport`] trait is the seam between the session-aware
//! [`Client`](crate::Client) and the wire, allowing for different
//! implementations:
//! - [`http::HttpTransport`] talks HTTPS to a real controller
//! - `memory::MemoryController` simulates one in-process for tests
//!   (`test-support` feature)

pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

use crate::error::Result;
use crate::types::{RawResponse, Request};

/// Send one request and return the raw response.
///
/// Implementations return `Ok` for every HTTP status, including errors;
/// `Err` is reserved for failures where no status was received.
pub trait Transport: Send + Sync {
    fn send(&self, request: &Request) -> Result<RawResponse>;
}
