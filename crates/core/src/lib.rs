//! docket-core: shared foundation of the docket workflow engine.
//!
//! Holds everything the other crates agree on:
//!
//! - [`model`] -- Case, WorkItem, Circulation, Activation, Message and the
//!   supporting records
//! - [`actor`] -- the acting identity resolved at the request edge
//! - [`config`] -- the per-deployment [`EngineConfig`] built once at startup
//! - [`error`] -- the [`EngineError`] taxonomy every layer surfaces
//! - [`labels`] -- well-known state labels, task ids and metadata keys
//! - [`clock`] -- RFC 3339 timestamp helpers
//!
//! Key types are re-exported at the crate root for convenience.

pub mod actor;
pub mod clock;
pub mod config;
pub mod error;
pub mod labels;
pub mod model;

// ── Convenience re-exports: key types ────────────────────────────────

pub use actor::Actor;
pub use config::{BatchFailureMode, EngineConfig, MutationKind, MutationRule};
pub use error::EngineError;
pub use model::{
    Activation, ActivationState, Attachment, Case, CaseStatus, Circulation, DecisionRecord,
    Document, HistoryEntry, Judgement, Message, Meta, Notice, NoticeKind, Service, ServiceLink,
    WorkItem, WorkItemStatus,
};
