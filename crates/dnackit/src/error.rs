//! Error types for controller API operations.
//!
//! Errors are categorized to enable smart retry logic and to let callers
//! map controller failures onto their own outcome vocabulary. Each error
//! keeps enough context (status code, controller message) to explain what
//! went wrong without echoing request payloads.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Categories of controller errors for retry and session logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network failure, request timeout, HTTP 5xx or 429 (transient, retryable)
    Transient,
    /// HTTP 401: the session token was refused
    AuthExpired,
    /// HTTP 404: the addressed object does not exist
    NotFound,
    /// Any other controller-side rejection, or a transient error that outlived its retries
    Upstream,
    /// The operation was interrupted by a cancellation signal
    Cancelled,
    /// Local misuse (bad path template, malformed credentials)
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Transient controller or network failure",
            Self::AuthExpired => "Session expired",
            Self::NotFound => "Object not found",
            Self::Upstream => "Controller rejected the request",
            Self::Cancelled => "Cancelled",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "Check controller reachability and try again",
            Self::AuthExpired => "Verify the credentials and the controller's token lifetime",
            Self::NotFound => "Verify the identity fields refer to an existing object",
            Self::Upstream => "Inspect the controller message for the rejected field",
            Self::Cancelled => "Re-run the invocation to finish the remaining operations",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the controller.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection-level failure (DNS, refused, reset, TLS).
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from the transport.
        message: String,
    },

    /// The per-request timeout elapsed.
    #[error("request timed out: {message}")]
    Timeout {
        /// Which phase of the request timed out.
        message: String,
    },

    /// The controller answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Controller-provided message, or the reason phrase.
        message: String,
        /// Optional controller-provided detail.
        detail: Option<String>,
    },

    /// Login was refused or the token endpoint answered without a token.
    #[error("authentication failed: {message}")]
    Auth {
        /// Why authentication failed.
        message: String,
    },

    /// The controller answered with a body we cannot interpret.
    #[error("invalid controller response: {0}")]
    InvalidResponse(String),

    /// A transient error persisted through every retry attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last: Box<Error>,
    },

    /// Cancelled while waiting between attempts or polls.
    #[error("operation cancelled")]
    Cancelled,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an HTTP error from a status code and a controller error body.
    ///
    /// The controller reports errors in a few shapes (`{message, detail}`,
    /// `{response: {message, detail}}`, `{error: ...}`); all are accepted.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let scope = body.get("response").filter(|r| r.is_object()).unwrap_or(body);
        let text = |key: &str| {
            scope
                .get(key)
                .or_else(|| body.get(key))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
        };

        let message = text("message")
            .or_else(|| text("error"))
            .or_else(|| text("errorCode"))
            .or_else(|| body.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("request failed with status {status}"));

        Self::Http {
            status,
            message,
            detail: text("detail"),
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } | Error::Timeout { .. } => ErrorCategory::Transient,
            Error::Http { status, .. } => match *status {
                401 => ErrorCategory::AuthExpired,
                404 => ErrorCategory::NotFound,
                429 | 500..=599 => ErrorCategory::Transient,
                _ => ErrorCategory::Upstream,
            },
            Error::Auth { .. } | Error::InvalidResponse(_) | Error::RetriesExhausted { .. } => {
                ErrorCategory::Upstream
            }
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match &err {
            ureq::Error::StatusCode(code) => Self::Http {
                status: *code,
                message: format!("HTTP {code}"),
                detail: None,
            },
            ureq::Error::Timeout(_) => Self::Timeout {
                message: err.to_string(),
            },
            _ => Self::Network {
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::AuthExpired.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Upstream.is_retryable());
        assert!(!ErrorCategory::Cancelled.is_retryable());
    }

    #[test]
    fn test_http_status_classification() {
        let category = |status| Error::from_response(status, &Value::Null).category();
        assert_eq!(category(401), ErrorCategory::AuthExpired);
        assert_eq!(category(404), ErrorCategory::NotFound);
        assert_eq!(category(429), ErrorCategory::Transient);
        assert_eq!(category(500), ErrorCategory::Transient);
        assert_eq!(category(503), ErrorCategory::Transient);
        assert_eq!(category(400), ErrorCategory::Upstream);
        assert_eq!(category(409), ErrorCategory::Upstream);
    }

    #[test]
    fn test_from_response_reads_nested_message() {
        let body = json!({"response": {"errorCode": "NCSP10250", "message": "SSID exists", "detail": "name taken"}});
        match Error::from_response(400, &body) {
            Error::Http {
                status,
                message,
                detail,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "SSID exists");
                assert_eq!(detail.as_deref(), Some("name taken"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_response_without_body() {
        let err = Error::from_response(502, &Value::Null);
        assert!(err.to_string().contains("502"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retries_exhausted_is_upstream() {
        let err = Error::RetriesExhausted {
            attempts: 3,
            last: Box::new(Error::from_response(503, &Value::Null)),
        };
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_error_category_display() {
        assert!(format!("{}", ErrorCategory::Transient).contains("Transient"));
        assert!(!ErrorCategory::Upstream.advice().is_empty());
    }
}
