//! Engine configuration.
//!
//! One [`EngineConfig`] is built at process start (from a TOML file or
//! [`Default::default`]) and passed by reference into every component that
//! needs deployment-specific vocabulary: lifecycle-state sets, permission
//! tables, remote-ACL allow-lists, task lead times. Nothing in the engine
//! reads global mutable settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::labels;

/// Top-level configuration, one per deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub acl: AclConfig,
    #[serde(default)]
    pub circulation: CirculationConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl EngineConfig {
    /// Check internal consistency. Returns all problems, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        if self.deployment.sender_id.is_empty() {
            problems.push("deployment.sender_id must not be empty".to_string());
        }
        if self.acl.base_url.is_empty() {
            problems.push("acl.base_url must not be empty".to_string());
        }
        if self.lifecycle.review_states.is_empty() {
            problems.push("lifecycle.review_states must not be empty".to_string());
        }
        for (workflow, state) in &self.lifecycle.granted_state {
            if state.is_empty() {
                problems.push(format!(
                    "lifecycle.granted_state.{} must not be empty",
                    workflow
                ));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// `[deployment]` — identity of this installation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Sender id stamped into outbound envelope headers.
    pub sender_id: String,
    /// Marks outbound envelopes as test deliveries.
    #[serde(default)]
    pub test_delivery: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        DeploymentConfig {
            sender_id: "docket-dev".to_string(),
            test_delivery: true,
        }
    }
}

/// `[lifecycle]` — the deployment's lifecycle-state vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// States in which a ruling notice may be applied.
    pub review_states: Vec<String>,
    /// States in which a kind-of-proceedings notice may be applied.
    pub early_process_states: Vec<String>,
    /// State required for archive closure.
    pub finish_pending_state: String,
    pub finished_state: String,
    pub rejected_state: String,
    /// State entered when a kind-of-proceedings notice opens a circulation.
    pub circulation_state: String,
    /// Target state after a granted ruling, per workflow slug.
    pub granted_state: BTreeMap<String, String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        let mut granted_state = BTreeMap::new();
        granted_state.insert(
            labels::WORKFLOW_BUILDING_PERMIT.to_string(),
            labels::STATE_REPORT_PHASE.to_string(),
        );
        granted_state.insert(
            labels::WORKFLOW_PRELIMINARY.to_string(),
            labels::STATE_FINISHED.to_string(),
        );
        LifecycleConfig {
            review_states: vec![
                labels::STATE_DOSSIER_REVIEW.to_string(),
                labels::STATE_COORDINATION.to_string(),
            ],
            early_process_states: vec![labels::STATE_PROGRAM_INIT.to_string()],
            finish_pending_state: labels::STATE_TO_BE_FINISHED.to_string(),
            finished_state: labels::STATE_FINISHED.to_string(),
            rejected_state: labels::STATE_REJECTED.to_string(),
            circulation_state: labels::STATE_CIRCULATION.to_string(),
            granted_state,
        }
    }
}

impl LifecycleConfig {
    pub fn is_review_state(&self, state: &str) -> bool {
        self.review_states.iter().any(|s| s == state)
    }

    pub fn is_early_process_state(&self, state: &str) -> bool {
        self.early_process_states.iter().any(|s| s == state)
    }

    /// Target state for a granted ruling, if the workflow defines one.
    pub fn granted_state_for(&self, workflow: &str) -> Option<&str> {
        self.granted_state.get(workflow).map(String::as_str)
    }
}

/// A mutation kind the visibility gate can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    StartCase,
    SaveCase,
    SaveDocument,
    SaveAnswer,
    RemoveAnswer,
}

/// Outcome of a permission-table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MutationRule {
    Allow,
    Deny,
    /// Delegate to the remote-edit check against the legacy ACL service.
    Remote { only_meta: bool },
}

/// Per-mutation rules: exact role entries plus an explicit default
/// sentinel. The sentinel is a real entry, not an inheritance fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutationRules {
    #[serde(default)]
    pub roles: BTreeMap<String, MutationRule>,
    pub default: MutationRule,
}

impl MutationRules {
    pub fn for_role(&self, role: &str) -> MutationRule {
        self.roles.get(role).copied().unwrap_or(self.default)
    }
}

/// `[permissions]` — mutation gating table and remote-ACL allow-lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionConfig {
    /// Rules keyed by mutation kind. Kinds absent from the table deny.
    pub mutations: BTreeMap<MutationKind, MutationRules>,
    /// Legacy lifecycle-state ids in which a role may edit; keyed by role
    /// with a `_default` sentinel for unlisted roles.
    pub remote_states: BTreeMap<String, Vec<String>>,
    /// Narrower allow-list that additionally applies to meta-only edits.
    pub remote_states_meta: BTreeMap<String, Vec<String>>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        let mut mutations = BTreeMap::new();
        let mut start_roles = BTreeMap::new();
        start_roles.insert(labels::ROLE_APPLICANT.to_string(), MutationRule::Allow);
        start_roles.insert(labels::ROLE_SUPPORT.to_string(), MutationRule::Allow);
        mutations.insert(
            MutationKind::StartCase,
            MutationRules {
                roles: start_roles,
                default: MutationRule::Deny,
            },
        );
        mutations.insert(
            MutationKind::SaveCase,
            MutationRules {
                roles: BTreeMap::new(),
                default: MutationRule::Remote { only_meta: true },
            },
        );
        for kind in [MutationKind::SaveDocument, MutationKind::SaveAnswer] {
            mutations.insert(
                kind,
                MutationRules {
                    roles: BTreeMap::new(),
                    default: MutationRule::Remote { only_meta: false },
                },
            );
        }
        let mut remove_roles = BTreeMap::new();
        remove_roles.insert(labels::ROLE_SUPPORT.to_string(), MutationRule::Allow);
        mutations.insert(
            MutationKind::RemoveAnswer,
            MutationRules {
                roles: remove_roles,
                default: MutationRule::Remote { only_meta: false },
            },
        );

        let mut remote_states = BTreeMap::new();
        remote_states.insert(
            labels::ROLE_APPLICANT.to_string(),
            vec!["1".to_string(), "10000".to_string()],
        );
        remote_states.insert(labels::ROLE_DEFAULT.to_string(), vec!["20007".to_string()]);

        let mut remote_states_meta = BTreeMap::new();
        remote_states_meta.insert(
            labels::ROLE_MUNICIPALITY.to_string(),
            vec!["20000".to_string()],
        );
        remote_states_meta.insert(labels::ROLE_DEFAULT.to_string(), Vec::new());

        PermissionConfig {
            mutations,
            remote_states,
            remote_states_meta,
        }
    }
}

impl PermissionConfig {
    /// Rule for a (mutation kind, role) pair. Unlisted kinds deny.
    pub fn rule_for(&self, kind: MutationKind, role: &str) -> MutationRule {
        self.mutations
            .get(&kind)
            .map(|rules| rules.for_role(role))
            .unwrap_or(MutationRule::Deny)
    }

    /// Allowed legacy state ids for a role, falling back to `_default`.
    pub fn remote_states_for(&self, role: &str) -> &[String] {
        lookup_with_default(&self.remote_states, role)
    }

    /// Meta-edit allow-list for a role, falling back to `_default`.
    pub fn remote_states_meta_for(&self, role: &str) -> &[String] {
        lookup_with_default(&self.remote_states_meta, role)
    }
}

fn lookup_with_default<'a>(map: &'a BTreeMap<String, Vec<String>>, role: &str) -> &'a [String] {
    map.get(role)
        .or_else(|| map.get(labels::ROLE_DEFAULT))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// `[acl]` — the legacy ACL collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AclConfig {
    /// Base URL of the legacy system, without trailing slash.
    pub base_url: String,
}

impl Default for AclConfig {
    fn default() -> Self {
        AclConfig {
            base_url: "http://localhost:8020".to_string(),
        }
    }
}

/// `[circulation]` — circulation and visibility tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CirculationConfig {
    /// Lifecycle states in which responsibility reassignment touches
    /// circulations.
    pub reassignment_states: Vec<String>,
    /// Form slug whose documents are visible to everyone.
    pub dashboard_form: String,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        CirculationConfig {
            reassignment_states: vec![
                labels::STATE_CIRCULATION_INIT.to_string(),
                labels::STATE_CIRCULATION.to_string(),
            ],
            dashboard_form: "dashboard".to_string(),
        }
    }
}

/// `[tasks]` — per-task deadline lead times.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Days from creation to deadline, per task id. Tasks without an
    /// entry get no deadline.
    pub lead_time_days: BTreeMap<String, i64>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        let mut lead_time_days = BTreeMap::new();
        lead_time_days.insert(labels::TASK_CIRCULATION.to_string(), 30);
        lead_time_days.insert(labels::TASK_ACTIVATION.to_string(), 14);
        TaskConfig { lead_time_days }
    }
}

impl TaskConfig {
    pub fn lead_time_for(&self, task_id: &str) -> Option<i64> {
        self.lead_time_days.get(task_id).copied()
    }
}

/// `[notifications]` — outbound notification templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Template for the acknowledgment sent to a service invited via the
    /// protocol. None means the task handler refuses such envelopes.
    pub task_template: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            task_template: Some("task-assigned".to_string()),
        }
    }
}

/// How a bulk job behaves when one case in the batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchFailureMode {
    /// One transaction per case; stop at the first error, keep the prefix.
    CommitPrefix,
    /// One transaction for the whole batch; abort everything on error.
    RollbackBatch,
}

/// `[migration]` — bulk-job defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    pub failure_mode: BatchFailureMode,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            failure_mode: BatchFailureMode::CommitPrefix,
        }
    }
}
