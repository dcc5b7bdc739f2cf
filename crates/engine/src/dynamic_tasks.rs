//! Dynamic follow-up task resolution.
//!
//! Completing certain work items marks a milestone in a case's life
//! (the ruling is in, the circulation round closed). Which work items
//! come next is not wired into the workflow definition; it depends on
//! runtime facts like the workflow slug, the lifecycle state and whether
//! a granted decision exists. Resolvers registered under milestone names
//! answer that question; the driver in this module runs them and creates
//! the returned tasks inside the caller's unit of work.
//!
//! - [`DynamicTaskRegistry`] — resolvers keyed by milestone name, plus
//!   the task-id → milestone links that fire them
//! - [`complete_work_item`] — complete + fan out, one unit of work
//! - [`Propagation`] — suppression switch for bulk jobs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use docket_core::clock;
use docket_core::labels;
use docket_core::model::{Case, Meta, WorkItem, WorkItemStatus};
use docket_core::{Actor, EngineConfig, EngineError};
use docket_store::CaseStore;

// ── Propagation switch ───────────────────────────────────────────────

/// Shared switch that turns milestone fan-out off while held.
///
/// Bulk jobs (circulation migration) create and complete work items that
/// already reflect the target shape; running resolvers mid-batch would
/// double-create follow-ups. Suppression nests and is restored on drop.
#[derive(Debug, Clone, Default)]
pub struct Propagation {
    suppressed: Arc<AtomicUsize>,
}

impl Propagation {
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst) > 0
    }

    /// Suppress fan-out until the returned guard drops.
    pub fn suppress(&self) -> SuppressionGuard {
        self.suppressed.fetch_add(1, Ordering::SeqCst);
        SuppressionGuard {
            suppressed: Arc::clone(&self.suppressed),
        }
    }
}

/// Restores the [`Propagation`] switch on drop, early return and panic
/// included.
pub struct SuppressionGuard {
    suppressed: Arc<AtomicUsize>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.suppressed.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Resolution context ───────────────────────────────────────────────

/// Read-only snapshot a resolver branches on. Assembled by the driver
/// from the staged view of the unit of work that fired the milestone.
pub struct MilestoneContext<'a> {
    pub case: &'a Case,
    pub actor: &'a Actor,
    /// The work item whose completion fired the milestone, when one did.
    pub prior_work_item: Option<&'a WorkItem>,
    /// Circulation rows still present for the case, resolved or not.
    pub circulation_count: usize,
    /// Whether any decision record with a granted judgement exists.
    pub has_granted_decision: bool,
    /// Free-form caller context, e.g. from an event endpoint body.
    pub context: &'a Meta,
}

/// A milestone resolver. Pure and read-only; returns the task ids to
/// create next, possibly none. Creation is the driver's job.
pub type Resolver = fn(&MilestoneContext<'_>) -> Vec<String>;

// ── Registry ─────────────────────────────────────────────────────────

/// Resolvers keyed by milestone name, plus the task ids whose completion
/// fires each milestone. Built once at startup; [`standard`] wires the
/// builtin set.
///
/// [`standard`]: DynamicTaskRegistry::standard
pub struct DynamicTaskRegistry {
    resolvers: BTreeMap<String, Vec<Resolver>>,
    task_milestones: BTreeMap<String, String>,
    propagation: Propagation,
}

impl DynamicTaskRegistry {
    pub fn new() -> Self {
        DynamicTaskRegistry {
            resolvers: BTreeMap::new(),
            task_milestones: BTreeMap::new(),
            propagation: Propagation::default(),
        }
    }

    /// The builtin registry: decision and circulation follow-ups.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(labels::MILESTONE_AFTER_DECISION, resolve_after_decision);
        registry.register(
            labels::MILESTONE_AFTER_CIRCULATION,
            resolve_after_circulation,
        );
        registry.link_task(labels::TASK_DECISION, labels::MILESTONE_AFTER_DECISION);
        registry.link_task(labels::TASK_CIRCULATION, labels::MILESTONE_AFTER_CIRCULATION);
        registry
    }

    /// Register a resolver under a milestone name. Resolvers run in
    /// registration order.
    pub fn register(&mut self, milestone: &str, resolver: Resolver) {
        self.resolvers
            .entry(milestone.to_string())
            .or_default()
            .push(resolver);
    }

    /// Fire `milestone` whenever a work item with `task_id` completes.
    pub fn link_task(&mut self, task_id: &str, milestone: &str) {
        self.task_milestones
            .insert(task_id.to_string(), milestone.to_string());
    }

    pub fn milestone_for(&self, task_id: &str) -> Option<&str> {
        self.task_milestones.get(task_id).map(String::as_str)
    }

    pub fn propagation(&self) -> &Propagation {
        &self.propagation
    }

    /// Run every resolver registered under `milestone`, deduplicating
    /// while preserving order. Unknown milestone names resolve to nothing.
    pub fn resolve(&self, milestone: &str, ctx: &MilestoneContext<'_>) -> Vec<String> {
        let mut tasks: Vec<String> = Vec::new();
        for resolver in self.resolvers.get(milestone).into_iter().flatten() {
            for task in resolver(ctx) {
                if !tasks.contains(&task) {
                    tasks.push(task);
                }
            }
        }
        tasks
    }
}

impl Default for DynamicTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Builtin resolvers ────────────────────────────────────────────────

/// After a ruling: the full building-permit workflow continues into the
/// report phase, but only on a granted outcome. Rejections and the
/// preliminary workflow get no follow-up tasks.
fn resolve_after_decision(ctx: &MilestoneContext<'_>) -> Vec<String> {
    if ctx.case.workflow == labels::WORKFLOW_BUILDING_PERMIT && ctx.has_granted_decision {
        vec![
            labels::TASK_REPORT_PHASE.to_string(),
            labels::TASK_CREATE_MANUAL_WORKITEMS.to_string(),
            labels::TASK_CREATE_PUBLICATION.to_string(),
        ]
    } else {
        Vec::new()
    }
}

/// After a circulation round closes: what comes next depends on whether
/// any circulation row is left and on the lifecycle state.
fn resolve_after_circulation(ctx: &MilestoneContext<'_>) -> Vec<String> {
    match (ctx.circulation_count, ctx.case.state.as_str()) {
        (0, labels::STATE_CIRCULATION_INIT) => vec![
            labels::TASK_SKIP_CIRCULATION.to_string(),
            labels::TASK_INIT_CIRCULATION.to_string(),
        ],
        (0, labels::STATE_CIRCULATION) => vec![
            labels::TASK_START_CIRCULATION.to_string(),
            labels::TASK_START_DECISION.to_string(),
        ],
        _ => vec![
            labels::TASK_START_CIRCULATION.to_string(),
            labels::TASK_CHECK_ACTIVATION.to_string(),
            labels::TASK_START_DECISION.to_string(),
        ],
    }
}

// ── Driver ───────────────────────────────────────────────────────────

/// Complete a ready work item and fan out its milestone, all inside the
/// caller's unit of work. Returns the task ids actually created.
///
/// Completing a `circulation` backing item while its activations are
/// still open is a validation error; fan-in goes through the
/// circulation orchestrator, which resolves the activations first.
pub async fn complete_work_item<S: CaseStore>(
    registry: &DynamicTaskRegistry,
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    actor: &Actor,
    work_item_id: &str,
) -> Result<Vec<String>, EngineError> {
    let mut item = store.get_work_item_for_update(txn, work_item_id).await?;
    if !item.is_ready() {
        return Err(EngineError::validation(format!(
            "work item {} is not ready",
            item.id
        )));
    }
    if item.task_id == labels::TASK_CIRCULATION {
        if let Some(circulation_id) = item
            .meta
            .get(labels::META_CIRCULATION_ID)
            .and_then(|v| v.as_str())
        {
            let open = store
                .activations_for_circulation(txn, circulation_id)
                .await?
                .iter()
                .filter(|a| a.state.is_open())
                .count();
            if open > 0 {
                return Err(EngineError::validation(format!(
                    "circulation {} still has {} open activations",
                    circulation_id, open
                )));
            }
        }
    }

    item.status = WorkItemStatus::Completed;
    let completed = item.clone();
    store.update_work_item(txn, item).await?;
    store
        .append_history(
            txn,
            &completed.case_id,
            &actor.username,
            actor.service(),
            &format!("Work item '{}' completed", completed.task_id),
        )
        .await?;

    let Some(milestone) = registry.milestone_for(&completed.task_id) else {
        return Ok(Vec::new());
    };
    let milestone = milestone.to_string();
    let context = Meta::new();
    fire_milestone(
        registry,
        store,
        txn,
        config,
        actor,
        &completed.case_id,
        &milestone,
        Some(&completed),
        &context,
    )
    .await
}

/// Run the resolvers of `milestone` and create the resolved task ids,
/// idempotently, inside the caller's unit of work. Does nothing while
/// propagation is suppressed. Returns the task ids actually created.
#[allow(clippy::too_many_arguments)]
pub async fn fire_milestone<S: CaseStore>(
    registry: &DynamicTaskRegistry,
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    actor: &Actor,
    case_id: &str,
    milestone: &str,
    prior_work_item: Option<&WorkItem>,
    context: &Meta,
) -> Result<Vec<String>, EngineError> {
    if registry.propagation().is_suppressed() {
        debug!(milestone, case = case_id, "fan-out suppressed");
        return Ok(Vec::new());
    }

    let case = store.get_case_for_update(txn, case_id).await?;
    let circulation_count = store.circulations_for_case(txn, case_id).await?.len();
    let has_granted_decision = store
        .decisions_for_case(txn, case_id)
        .await?
        .iter()
        .any(|d| d.judgement.is_granted());

    let ctx = MilestoneContext {
        case: &case,
        actor,
        prior_work_item,
        circulation_count,
        has_granted_decision,
        context,
    };
    let tasks = registry.resolve(milestone, &ctx);
    if tasks.is_empty() {
        return Ok(tasks);
    }

    let created = create_work_items(store, txn, config, &case, &tasks, &Meta::new()).await?;
    if !created.is_empty() {
        store
            .append_history(
                txn,
                case_id,
                &actor.username,
                actor.service(),
                &format!("Created follow-up work items: {}", created.join(", ")),
            )
            .await?;
    }
    Ok(created)
}

/// Create one ready work item per task id, skipping tasks that already
/// have a ready or completed item on the case. Deadlines come from the
/// per-task lead-time configuration; `meta` is stamped onto every
/// created item. Returns the created task ids.
pub async fn create_work_items<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    case: &Case,
    task_ids: &[String],
    meta: &Meta,
) -> Result<Vec<String>, EngineError> {
    let existing = store.work_items_for_case(txn, &case.id).await?;
    let mut satisfied: BTreeSet<String> = existing
        .iter()
        .filter(|w| {
            matches!(
                w.status,
                WorkItemStatus::Ready | WorkItemStatus::Completed
            )
        })
        .map(|w| w.task_id.clone())
        .collect();

    let groups: BTreeSet<String> = case
        .active_service()
        .map(|s| s.to_string())
        .into_iter()
        .collect();

    let mut created = Vec::new();
    for task_id in task_ids {
        if satisfied.contains(task_id) {
            debug!(task = %task_id, case = %case.id, "task already present, skipping");
            continue;
        }
        let id = store.mint_id(txn, "work-item").await?;
        store
            .insert_work_item(
                txn,
                WorkItem {
                    id,
                    task_id: task_id.clone(),
                    status: WorkItemStatus::Ready,
                    case_id: case.id.clone(),
                    child_case_id: None,
                    addressed_groups: groups.clone(),
                    controlling_groups: groups.clone(),
                    assigned_users: Vec::new(),
                    deadline: config
                        .tasks
                        .lead_time_for(task_id)
                        .map(clock::rfc3339_in_days),
                    meta: meta.clone(),
                    created_at: clock::now_rfc3339(),
                },
            )
            .await?;
        satisfied.insert(task_id.clone());
        created.push(task_id.clone());
    }
    Ok(created)
}

/// Skip a still-ready work item. No milestone fires; skipping is how
/// stale items leave the board.
pub async fn skip_work_item<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    actor: &Actor,
    work_item_id: &str,
) -> Result<(), EngineError> {
    let mut item = store.get_work_item_for_update(txn, work_item_id).await?;
    if !item.is_ready() {
        return Ok(());
    }
    item.status = WorkItemStatus::Skipped;
    let case_id = item.case_id.clone();
    let task_id = item.task_id.clone();
    store.update_work_item(txn, item).await?;
    store
        .append_history(
            txn,
            &case_id,
            &actor.username,
            actor.service(),
            &format!("Work item '{}' skipped", task_id),
        )
        .await?;
    Ok(())
}

/// Cancel every ready work item of a case. Used when a case is
/// withdrawn. Returns how many items were canceled.
pub async fn cancel_ready_work_items<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    actor: &Actor,
    case_id: &str,
) -> Result<usize, EngineError> {
    let items = store.work_items_for_case(txn, case_id).await?;
    let mut canceled = 0;
    for mut item in items {
        if !item.is_ready() {
            continue;
        }
        item.status = WorkItemStatus::Canceled;
        store.update_work_item(txn, item).await?;
        canceled += 1;
    }
    if canceled > 0 {
        store
            .append_history(
                txn,
                case_id,
                &actor.username,
                actor.service(),
                &format!("Canceled {} open work items", canceled),
            )
            .await?;
    }
    Ok(canceled)
}
