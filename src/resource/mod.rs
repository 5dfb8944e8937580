//! Built-in resource kinds
//!
//! Each kind is a descriptor: data telling the reconciler how to validate,
//! identify, read, compare and write objects of that kind. Adding a kind
//! means adding a module here and registering it below.

use declarative::{Registry, Result};

pub mod discovery;
pub mod site;
pub mod ssid;
pub mod user;

/// Registry of every built-in kind.
pub fn registry() -> Result<Registry> {
    Registry::builder()
        .register(site::descriptor()?)?
        .register(ssid::descriptor()?)?
        .register(discovery::descriptor()?)?
        .register(user::descriptor()?)?
        .build()
}

// ============================================================================
// Tests
// ============================================================================
