//! Well-known vocabulary: lifecycle-state labels, task ids, milestone
//! names, roles, metadata keys and attachment sections.
//!
//! Deployments may extend any of these through configuration; the engine
//! itself only hard-wires the task ids its builtin resolvers return and
//! the meta keys it stamps.

// ── Lifecycle-state labels ───────────────────────────────────────────

/// Circulation not yet started; skip/init decision pending.
pub const STATE_CIRCULATION_INIT: &str = "circulation_init";
/// A circulation round is (or was) running.
pub const STATE_CIRCULATION: &str = "circulation";
/// Formal completeness review of the dossier.
pub const STATE_DOSSIER_REVIEW: &str = "DossierPruefung";
/// Multi-authority coordination review.
pub const STATE_COORDINATION: &str = "Koordination";
/// Report phase following a granted ruling.
pub const STATE_REPORT_PHASE: &str = "SB1";
/// Awaiting archive closure.
pub const STATE_TO_BE_FINISHED: &str = "ToBeFinished";
pub const STATE_FINISHED: &str = "Finished";
pub const STATE_REJECTED: &str = "Rejected";
/// Procedure program not yet established.
pub const STATE_PROGRAM_INIT: &str = "ProgramInit";

// ── Task ids ─────────────────────────────────────────────────────────

pub const TASK_CIRCULATION: &str = "circulation";
pub const TASK_ACTIVATION: &str = "activation";
pub const TASK_DECISION: &str = "decision";
pub const TASK_SKIP_CIRCULATION: &str = "skip-circulation";
pub const TASK_INIT_CIRCULATION: &str = "init-circulation";
pub const TASK_START_CIRCULATION: &str = "start-circulation";
pub const TASK_CHECK_ACTIVATION: &str = "check-activation";
pub const TASK_START_DECISION: &str = "start-decision";
pub const TASK_REPORT_PHASE: &str = "sb1";
pub const TASK_CREATE_MANUAL_WORKITEMS: &str = "create-manual-workitems";
pub const TASK_CREATE_PUBLICATION: &str = "create-publication";

// ── Milestones ───────────────────────────────────────────────────────

pub const MILESTONE_AFTER_DECISION: &str = "after-decision";
pub const MILESTONE_AFTER_CIRCULATION: &str = "after-circulation";

// ── Workflows ────────────────────────────────────────────────────────

pub const WORKFLOW_BUILDING_PERMIT: &str = "building-permit";
pub const WORKFLOW_PRELIMINARY: &str = "preliminary-clarification";

// ── Roles ────────────────────────────────────────────────────────────

pub const ROLE_APPLICANT: &str = "applicant";
pub const ROLE_MUNICIPALITY: &str = "municipality";
pub const ROLE_SERVICE: &str = "service";
pub const ROLE_SUPPORT: &str = "support";
/// Sentinel key for role-keyed config tables.
pub const ROLE_DEFAULT: &str = "_default";

// ── Metadata keys ────────────────────────────────────────────────────

/// External correlation id of the case in the legacy system.
pub const META_LEGACY_ID: &str = "legacy-id";
pub const META_DOSSIER_NUMBER: &str = "dossier-number";
/// Username of the applicant who created the case.
pub const META_APPLICANT: &str = "applicant";
/// On `circulation` work items: the circulation they back.
pub const META_CIRCULATION_ID: &str = "circulation-id";
/// On `activation` work items: the activation they back.
pub const META_ACTIVATION_ID: &str = "activation-id";
/// On activations created by an inbound protocol task.
pub const META_ECH_MESSAGE_CREATED: &str = "ech-message-created";
pub const META_MIGRATED: &str = "migrated";
pub const META_NOT_VIEWED: &str = "not-viewed";
pub const META_NOTIFY_DEADLINE: &str = "notify-deadline";
pub const META_NOTIFY_COMPLETED: &str = "notify-completed";

// ── Attachment sections ──────────────────────────────────────────────

pub const SECTION_SHARED_ALL: &str = "shared-with-all";
pub const SECTION_AUTHORITIES: &str = "shared-with-authorities";

// ── Claim (supplementary demand) row fields ──────────────────────────

pub const CLAIM_STATUS_DRAFT: &str = "draft";
pub const CLAIM_STATUS_IN_PROGRESS: &str = "in-progress";
pub const CLAIM_STATUS_ANSWERED: &str = "answered";
pub const CLAIM_STATUS_FIELD: &str = "status";
