//! Core types for declarative reconciliation

use dnackit::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Desired-state mode of one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Create missing items, update differing ones, leave the rest alone
    #[default]
    Merged,
    /// Remove declared items that exist
    Deleted,
    /// Like merged, plus remove undeclared items in the declared scope
    Replaced,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Deleted => "deleted",
            Self::Replaced => "replaced",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merged" => Ok(Self::Merged),
            "deleted" => Ok(Self::Deleted),
            "replaced" => Ok(Self::Replaced),
            other => Err(format!(
                "unknown state '{other}' (expected merged, deleted or replaced)"
            )),
        }
    }
}

/// What an operation does to one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Update,
    Delete,
    Noop,
}

impl OpKind {
    /// Check if the operation mutates the controller
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Noop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Noop => "noop",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed item or invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Schema validation failed; no API calls were made
    InvalidInput,
    /// `id` and identity fields refer to different current objects
    AmbiguousIdentity,
    /// An object addressed by id does not exist
    NotFound,
    /// Network error, 5xx or 429 that was not retried away
    Transient,
    /// Session refused
    AuthExpired,
    /// Controller rejected the request or its task failed
    UpstreamFailure,
    /// Task did not terminate before the deadline
    DeadlineExceeded,
    /// Post-apply re-read disagrees with the desired state
    VerificationMismatch,
    /// Dependency keys form a cycle
    DependencyCycle,
    /// The controller returned two objects with the same identity
    DuplicateIdentity,
    /// An item this one depends on failed or is being deleted
    DependencyFailed,
    /// Interrupted by a cancellation signal
    Cancelled,
    /// Not attempted because a plan-fatal operation failed
    PlanAborted,
}

impl ErrorKind {
    /// Map a controller client error onto a kind.
    pub fn from_api(err: &dnackit::Error) -> Self {
        match err.category() {
            ErrorCategory::Transient => Self::Transient,
            ErrorCategory::AuthExpired => Self::AuthExpired,
            ErrorCategory::NotFound => Self::NotFound,
            ErrorCategory::Cancelled => Self::Cancelled,
            ErrorCategory::Upstream | ErrorCategory::Other => Self::UpstreamFailure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::AmbiguousIdentity => "AmbiguousIdentity",
            Self::NotFound => "NotFound",
            Self::Transient => "Transient",
            Self::AuthExpired => "AuthExpired",
            Self::UpstreamFailure => "UpstreamFailure",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::VerificationMismatch => "VerificationMismatch",
            Self::DependencyCycle => "DependencyCycle",
            Self::DuplicateIdentity => "DuplicateIdentity",
            Self::DependencyFailed => "DependencyFailed",
            Self::Cancelled => "Cancelled",
            Self::PlanAborted => "PlanAborted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
