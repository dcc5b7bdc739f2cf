//! Bulk re-alignment of legacy-shaped cases with the live task graph.
//!
//! Migrated dossiers arrive with a lifecycle state but without the work
//! items the engine would have created along the way. This job ensures,
//! per case, the items its state implies and synchronizes every
//! circulation round: a backing `circulation` item where reviews are
//! still open, an `activation` item per open review, and skips for
//! items whose review already resolved.
//!
//! The whole batch runs with milestone fan-out suppressed; created and
//! completed items must not trigger follow-up resolution mid-batch.

use serde::Serialize;
use tracing::{info, warn};

use docket_core::clock;
use docket_core::labels;
use docket_core::model::{Activation, Case, Circulation, Meta, WorkItem, WorkItemStatus};
use docket_core::{Actor, BatchFailureMode, EngineConfig, EngineError};
use docket_store::CaseStore;

use crate::circulation::circulation_work_item;
use crate::dynamic_tasks::{self, DynamicTaskRegistry};

/// What to migrate and how to fail.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Restrict the batch to these case ids. `None` migrates every case.
    pub case_ids: Option<Vec<String>>,
    pub failure_mode: BatchFailureMode,
}

impl MigrationOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        MigrationOptions {
            case_ids: None,
            failure_mode: config.migration.failure_mode,
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub cases_processed: usize,
    pub work_items_created: usize,
    pub work_items_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_case: Option<FailedCase>,
    pub success: bool,
}

/// The case that stopped the batch, with the error it raised.
#[derive(Debug, Clone, Serialize)]
pub struct FailedCase {
    pub case_id: String,
    pub error: String,
}

/// Run the migration batch.
///
/// `CommitPrefix` commits one unit of work per case and stops at the
/// first failure, keeping everything before it. `RollbackBatch` stages
/// the whole batch in one unit of work and aborts it all on failure.
/// Either way the returned report says what happened; a failure is not
/// an `Err`, input problems (an unknown id while resolving the filter
/// under `RollbackBatch`) are.
pub async fn migrate_circulations<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    registry: &DynamicTaskRegistry,
    actor: &Actor,
    options: &MigrationOptions,
) -> Result<MigrationReport, EngineError> {
    let _guard = registry.propagation().suppress();

    let case_ids: Vec<String> = match &options.case_ids {
        Some(ids) => ids.clone(),
        None => store
            .list_cases()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect(),
    };
    info!(cases = case_ids.len(), mode = ?options.failure_mode, "starting circulation migration");

    let mut report = MigrationReport {
        cases_processed: 0,
        work_items_created: 0,
        work_items_skipped: 0,
        failed_case: None,
        success: true,
    };

    match options.failure_mode {
        BatchFailureMode::CommitPrefix => {
            for case_id in &case_ids {
                let mut txn = store.begin().await?;
                match migrate_case(store, &mut txn, config, actor, case_id).await {
                    Ok(counts) => {
                        store.commit(txn).await?;
                        report.cases_processed += 1;
                        report.work_items_created += counts.created;
                        report.work_items_skipped += counts.skipped;
                    }
                    Err(err) => {
                        let _ = store.abort(txn).await;
                        warn!(case = %case_id, %err, "migration failed, keeping the prefix");
                        report.failed_case = Some(FailedCase {
                            case_id: case_id.clone(),
                            error: err.to_string(),
                        });
                        report.success = false;
                        break;
                    }
                }
            }
        }
        BatchFailureMode::RollbackBatch => {
            let mut txn = store.begin().await?;
            let mut failed = None;
            for case_id in &case_ids {
                match migrate_case(store, &mut txn, config, actor, case_id).await {
                    Ok(counts) => {
                        report.cases_processed += 1;
                        report.work_items_created += counts.created;
                        report.work_items_skipped += counts.skipped;
                    }
                    Err(err) => {
                        failed = Some(FailedCase {
                            case_id: case_id.clone(),
                            error: err.to_string(),
                        });
                        break;
                    }
                }
            }
            match failed {
                None => store.commit(txn).await?,
                Some(failure) => {
                    let _ = store.abort(txn).await;
                    warn!(case = %failure.case_id, error = %failure.error, "migration failed, batch rolled back");
                    report = MigrationReport {
                        cases_processed: 0,
                        work_items_created: 0,
                        work_items_skipped: 0,
                        failed_case: Some(failure),
                        success: false,
                    };
                }
            }
        }
    }

    info!(
        cases = report.cases_processed,
        created = report.work_items_created,
        skipped = report.work_items_skipped,
        success = report.success,
        "circulation migration finished"
    );
    Ok(report)
}

struct CaseCounts {
    created: usize,
    skipped: usize,
}

async fn migrate_case<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    actor: &Actor,
    case_id: &str,
) -> Result<CaseCounts, EngineError> {
    let case = store.get_case_for_update(txn, case_id).await?;
    let mut counts = CaseCounts {
        created: 0,
        skipped: 0,
    };

    // 1. The items the lifecycle state implies.
    let circulations = store.circulations_for_case(txn, case_id).await?;
    let mut any_open_review = false;
    for circulation in &circulations {
        if store
            .activations_for_circulation(txn, &circulation.id)
            .await?
            .iter()
            .any(|a| a.state.is_open())
        {
            any_open_review = true;
            break;
        }
    }
    let chain = state_chain(config, &case, any_open_review);
    counts.created +=
        dynamic_tasks::create_work_items(store, txn, config, &case, &chain, &migration_meta())
            .await?
            .len();

    // 2. Synchronize each circulation round.
    for circulation in &circulations {
        let activations = store
            .activations_for_circulation(txn, &circulation.id)
            .await?;
        sync_circulation(store, txn, config, actor, circulation, &activations, &mut counts)
            .await?;
    }

    if counts.created > 0 || counts.skipped > 0 {
        store
            .append_history(
                txn,
                case_id,
                &actor.username,
                actor.service(),
                &format!(
                    "Aligned work items with the legacy dossier ({} created, {} skipped)",
                    counts.created, counts.skipped
                ),
            )
            .await?;
    }
    Ok(counts)
}

/// The task ids a lifecycle state implies. States past the active
/// phases (awaiting closure, closed, rejected) imply nothing.
fn state_chain(config: &EngineConfig, case: &Case, any_open_review: bool) -> Vec<String> {
    let state = case.state.as_str();
    if state == labels::STATE_CIRCULATION_INIT {
        return vec![
            labels::TASK_SKIP_CIRCULATION.to_string(),
            labels::TASK_INIT_CIRCULATION.to_string(),
        ];
    }
    if state == labels::STATE_CIRCULATION {
        let mut chain = vec![labels::TASK_START_CIRCULATION.to_string()];
        if any_open_review {
            chain.push(labels::TASK_CHECK_ACTIVATION.to_string());
        }
        chain.push(labels::TASK_START_DECISION.to_string());
        return chain;
    }
    if config.lifecycle.is_review_state(state) {
        return vec![labels::TASK_DECISION.to_string()];
    }
    if state == labels::STATE_REPORT_PHASE {
        return vec![
            labels::TASK_REPORT_PHASE.to_string(),
            labels::TASK_CREATE_MANUAL_WORKITEMS.to_string(),
            labels::TASK_CREATE_PUBLICATION.to_string(),
        ];
    }
    Vec::new()
}

async fn sync_circulation<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    actor: &Actor,
    circulation: &Circulation,
    activations: &[Activation],
    counts: &mut CaseCounts,
) -> Result<(), EngineError> {
    let backing = circulation_work_item(store, txn, &circulation.case_id, &circulation.id).await?;
    let round_open = activations.iter().any(|a| a.state.is_open());

    if round_open {
        if backing.is_none() {
            create_backing_item(store, txn, config, circulation).await?;
            counts.created += 1;
        }
    } else if let Some(item) = backing {
        // Round fully resolved; a still-ready backing item is stale.
        dynamic_tasks::skip_work_item(store, txn, actor, &item.id).await?;
        counts.skipped += 1;
    }

    for activation in activations {
        if activation.state.is_open() {
            if activation.work_item_id.is_none() {
                create_activation_item(store, txn, config, circulation, activation).await?;
                counts.created += 1;
            }
        } else if let Some(item_id) = &activation.work_item_id {
            let item = store.get_work_item_for_update(txn, item_id).await?;
            if item.is_ready() {
                dynamic_tasks::skip_work_item(store, txn, actor, item_id).await?;
                counts.skipped += 1;
            }
        }
    }
    Ok(())
}

async fn create_backing_item<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    circulation: &Circulation,
) -> Result<(), EngineError> {
    let id = store.mint_id(txn, "work-item").await?;
    let mut meta = migration_meta();
    meta.insert(
        labels::META_CIRCULATION_ID.to_string(),
        serde_json::Value::String(circulation.id.clone()),
    );
    store
        .insert_work_item(
            txn,
            WorkItem {
                id,
                task_id: labels::TASK_CIRCULATION.to_string(),
                status: WorkItemStatus::Ready,
                case_id: circulation.case_id.clone(),
                child_case_id: None,
                addressed_groups: [circulation.service_id.clone()].into(),
                controlling_groups: [circulation.service_id.clone()].into(),
                assigned_users: Vec::new(),
                deadline: config
                    .tasks
                    .lead_time_for(labels::TASK_CIRCULATION)
                    .map(clock::rfc3339_in_days),
                meta,
                created_at: clock::now_rfc3339(),
            },
        )
        .await?;
    Ok(())
}

async fn create_activation_item<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    circulation: &Circulation,
    activation: &Activation,
) -> Result<(), EngineError> {
    let item_id = store.mint_id(txn, "work-item").await?;
    let mut meta = migration_meta();
    meta.insert(
        labels::META_ACTIVATION_ID.to_string(),
        serde_json::Value::String(activation.id.clone()),
    );
    store
        .insert_work_item(
            txn,
            WorkItem {
                id: item_id.clone(),
                task_id: labels::TASK_ACTIVATION.to_string(),
                status: WorkItemStatus::Ready,
                case_id: circulation.case_id.clone(),
                child_case_id: None,
                addressed_groups: [activation.service_id.clone()].into(),
                controlling_groups: [activation.service_id.clone()].into(),
                assigned_users: Vec::new(),
                deadline: activation.deadline.clone().or_else(|| {
                    config
                        .tasks
                        .lead_time_for(labels::TASK_ACTIVATION)
                        .map(clock::rfc3339_in_days)
                }),
                meta,
                created_at: clock::now_rfc3339(),
            },
        )
        .await?;
    let mut updated = activation.clone();
    updated.work_item_id = Some(item_id);
    store.update_activation(txn, updated).await?;
    Ok(())
}

/// Meta stamped on every migration-created item. The notification
/// flags keep migrated items out of the completion mails the original
/// assignees never asked for.
fn migration_meta() -> Meta {
    let mut meta = Meta::new();
    meta.insert(labels::META_MIGRATED.to_string(), serde_json::Value::Bool(true));
    meta.insert(
        labels::META_NOT_VIEWED.to_string(),
        serde_json::Value::Bool(true),
    );
    meta.insert(
        labels::META_NOTIFY_DEADLINE.to_string(),
        serde_json::Value::Bool(true),
    );
    meta.insert(
        labels::META_NOTIFY_COMPLETED.to_string(),
        serde_json::Value::Bool(false),
    );
    meta
}
