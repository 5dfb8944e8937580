//! # Declarative
//!
//! Idempotent reconciliation of a controller against a desired-state
//! document.
//!
//! A document is a list of items, each naming a resource kind. Every kind is
//! described once by a [`ResourceDescriptor`]: its schema, how an object is
//! identified, which fields are compared, how current objects are read and
//! which endpoints create, update and delete them. The [`Reconciler`] then
//! drives a document through validate, login, load current, plan, execute,
//! verify and report, and always returns a [`Report`].
//!
//! ## Core Concepts
//!
//! - **Descriptor**: Declarative facts about one resource kind
//! - **Registry**: Every descriptor, keyed by kind
//! - **Plan**: Ordered create/update/delete/noop operations, dependencies first
//! - **Report**: One outcome per operation plus an overall verdict
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     AutoConfirm, Endpoint, FieldSpec, NoProgress, ReadOp, ReconcileOptions,
//!     Reconciler, Registry, ResourceDescriptor, Schema,
//! };
//!
//! let site = ResourceDescriptor::builder(
//!     "site",
//!     Schema::new()
//!         .field(FieldSpec::str("id"))
//!         .field(FieldSpec::str("name").required()),
//! )
//! .identity(&["name"])
//! .id_field("id")
//! .list(ReadOp::new("/dna/intent/api/v1/site"))
//! .create(Endpoint::post("/dna/intent/api/v1/site"))
//! .build()?;
//! let registry = Registry::builder().register(site)?.build()?;
//!
//! let reconciler = Reconciler::new(&registry, &client, ReconcileOptions::default());
//! let report = reconciler.run(&config, &mut NoProgress, &mut AutoConfirm);
//! println!("{}", report.msg);
//! ```
//!
//! ## Callback Traits
//!
//! - [`ReconcileObserver`]: Receives phase and per-operation progress
//! - [`ConfirmCallback`]: Approves a plan before the first mutating call
//!
//! This keeps the crate free of any terminal or UI dependency.

pub mod context;
pub mod descriptor;
pub mod document;
pub mod equality;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod report;
pub mod schema;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, Phase, ReconcileObserver};
pub use descriptor::{
    BodyShape, Delivery, DescriptorBuilder, Endpoint, Identity, ReadOp, Registry,
    RegistryBuilder, Reshape, ResourceDescriptor,
};
pub use document::{KIND_FIELD, validate_document};
pub use equality::{Compare, FieldChange, diff, equal};
pub use error::{Error, Result};
pub use planner::{DependencyCycle, Op, Plan};
pub use reconciler::{ReconcileOptions, Reconciler};
pub use report::{ItemDiff, Outcome, OutcomeError, OutcomeStatus, Report, Summary};
pub use schema::{FieldSpec, FieldType, NormalizedItem, Schema, Violation, ViolationKind};
pub use types::{ErrorKind, OpKind, State};
