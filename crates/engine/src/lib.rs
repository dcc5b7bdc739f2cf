//! docket-engine: the workflow logic between storage and the wire.
//!
//! Everything here runs inside a caller-owned storage unit of work and
//! is grouped by concern:
//!
//! - [`dynamic_tasks`] -- milestone-driven work item resolution and the
//!   propagation switch that bulk jobs flip off
//! - [`circulation`] -- review rounds: opening, per-service activations,
//!   fan-in completion, responsibility reassignment
//! - [`visibility`] -- per-request case/document visibility and the
//!   remote-edit permission gate backed by the legacy ACL service
//! - [`claims`] -- read/write permissions derived from claim rows
//! - [`migration`] -- bulk alignment of legacy-shaped cases with the
//!   live task graph

pub mod circulation;
pub mod claims;
pub mod dynamic_tasks;
pub mod migration;
pub mod visibility;

pub use circulation::{
    add_activation, complete_activation, open_circulation, open_empty_circulation,
    reassign_responsible_service, GroupReassigner, ReassignmentReport, WorkItemReassigner,
};
pub use claims::{claim_permissions, ClaimPermission};
pub use dynamic_tasks::{
    complete_work_item, fire_milestone, DynamicTaskRegistry, MilestoneContext, Propagation,
    SuppressionGuard,
};
pub use migration::{migrate_circulations, FailedCase, MigrationOptions, MigrationReport};
pub use visibility::{
    AclClient, AclOutcome, HttpAclClient, RequestScope, StaticAclClient, VisibilityGate,
};
