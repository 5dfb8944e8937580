//! Errors raised while building descriptors and registries

use thiserror::Error;

/// Errors for descriptor and registry construction.
///
/// Reconciliation failures are not errors of this type: they are captured
/// per item as [`ErrorKind`](crate::ErrorKind) in the report.
#[derive(Debug, Error)]
pub enum Error {
    /// A descriptor is internally inconsistent.
    #[error("descriptor '{kind}': {message}")]
    Descriptor { kind: String, message: String },

    /// Two descriptors claim the same kind.
    #[error("resource kind '{0}' registered twice")]
    DuplicateKind(String),

    /// A path template references a field with no value.
    #[error("path template '{template}' needs a value for '{field}'")]
    Template { template: String, field: String },
}

impl Error {
    pub(crate) fn descriptor(kind: &str, message: impl Into<String>) -> Self {
        Self::Descriptor {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for descriptor construction.
pub type Result<T> = std::result::Result<T, Error>;
