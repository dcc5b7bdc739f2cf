//! Circulation rounds and their activations.
//!
//! A circulation invites reviewing services to comment on a case. The
//! round is mirrored into the work-item graph: one backing `circulation`
//! item for the round, one `activation` item per invited service. This
//! module keeps the two representations in sync in both directions and
//! handles the responsibility handover between coordinating services.
//!
//! All operations run inside a caller-provided unit of work.

use async_trait::async_trait;
use tracing::debug;

use docket_core::clock;
use docket_core::labels;
use docket_core::model::{
    Activation, ActivationState, Circulation, Meta, Notice, WorkItem, WorkItemStatus,
};
use docket_core::{Actor, EngineConfig, EngineError};
use docket_store::CaseStore;

use crate::dynamic_tasks::{self, DynamicTaskRegistry};

// ── Opening a round ──────────────────────────────────────────────────

/// Open a circulation round inviting `targets`.
///
/// Zero targets create nothing and return `None`; the caller advances
/// the case through the skip path instead. Unknown target services are
/// a not-found error before anything is staged. `activation_meta` is
/// stamped onto every created activation.
#[allow(clippy::too_many_arguments)]
pub async fn open_circulation<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    actor: &Actor,
    case_id: &str,
    originating_service: &str,
    targets: &[String],
    activation_meta: &Meta,
) -> Result<Option<Circulation>, EngineError> {
    if targets.is_empty() {
        debug!(case = case_id, "no circulation targets, nothing to open");
        return Ok(None);
    }
    store.get_case_for_update(txn, case_id).await?;
    store.get_service(originating_service).await?;
    for target in targets {
        store.get_service(target).await?;
    }

    let circulation =
        create_circulation_row(store, txn, config, case_id, originating_service).await?;
    for target in targets {
        create_activation(
            store,
            txn,
            config,
            &circulation,
            target,
            originating_service,
            activation_meta,
        )
        .await?;
    }
    store
        .append_history(
            txn,
            case_id,
            &actor.username,
            actor.service(),
            &format!(
                "Opened circulation '{}' with {} invitations",
                circulation.name,
                targets.len()
            ),
        )
        .await?;
    Ok(Some(circulation))
}

/// Open a round with no invitations yet: the row and its backing work
/// item only. A kind-of-proceedings notice starts the circulation phase
/// this way; services are invited afterwards through [`add_activation`].
pub async fn open_empty_circulation<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    case_id: &str,
    originating_service: &str,
) -> Result<Circulation, EngineError> {
    store.get_case_for_update(txn, case_id).await?;
    store.get_service(originating_service).await?;
    create_circulation_row(store, txn, config, case_id, originating_service).await
}

/// Invite one more service into an existing circulation.
pub async fn add_activation<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    circulation: &Circulation,
    target_service: &str,
    activation_meta: &Meta,
) -> Result<Activation, EngineError> {
    store.get_service(target_service).await?;
    create_activation(
        store,
        txn,
        config,
        circulation,
        target_service,
        &circulation.service_id,
        activation_meta,
    )
    .await
}

/// Circulation row plus its backing `circulation` work item.
async fn create_circulation_row<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    case_id: &str,
    originating_service: &str,
) -> Result<Circulation, EngineError> {
    let now = clock::now_rfc3339();
    let id = store.mint_id(txn, "circulation").await?;
    let circulation = Circulation {
        id: id.clone(),
        name: format!("Circulation of {}", &now[..10]),
        case_id: case_id.to_string(),
        service_id: originating_service.to_string(),
        created_at: now.clone(),
        has_activity: false,
    };
    store.insert_circulation(txn, circulation.clone()).await?;

    let item_id = store.mint_id(txn, "work-item").await?;
    let mut meta = Meta::new();
    meta.insert(
        labels::META_CIRCULATION_ID.to_string(),
        serde_json::Value::String(id),
    );
    store
        .insert_work_item(
            txn,
            WorkItem {
                id: item_id,
                task_id: labels::TASK_CIRCULATION.to_string(),
                status: WorkItemStatus::Ready,
                case_id: case_id.to_string(),
                child_case_id: None,
                addressed_groups: [originating_service.to_string()].into(),
                controlling_groups: [originating_service.to_string()].into(),
                assigned_users: Vec::new(),
                deadline: config
                    .tasks
                    .lead_time_for(labels::TASK_CIRCULATION)
                    .map(clock::rfc3339_in_days),
                meta,
                created_at: now,
            },
        )
        .await?;
    Ok(circulation)
}

async fn create_activation<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    circulation: &Circulation,
    target_service: &str,
    parent_service: &str,
    activation_meta: &Meta,
) -> Result<Activation, EngineError> {
    let now = clock::now_rfc3339();
    let activation_id = store.mint_id(txn, "activation").await?;
    let item_id = store.mint_id(txn, "work-item").await?;
    let deadline = config
        .tasks
        .lead_time_for(labels::TASK_ACTIVATION)
        .map(clock::rfc3339_in_days);

    let mut item_meta = Meta::new();
    item_meta.insert(
        labels::META_ACTIVATION_ID.to_string(),
        serde_json::Value::String(activation_id.clone()),
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
                addressed_groups: [target_service.to_string()].into(),
                controlling_groups: [target_service.to_string()].into(),
                assigned_users: Vec::new(),
                deadline: deadline.clone(),
                meta: item_meta,
                created_at: now.clone(),
            },
        )
        .await?;

    let activation = Activation {
        id: activation_id,
        circulation_id: circulation.id.clone(),
        case_id: circulation.case_id.clone(),
        service_id: target_service.to_string(),
        service_parent_id: parent_service.to_string(),
        state: ActivationState::Pending,
        deadline,
        started_at: None,
        ended_at: None,
        work_item_id: Some(item_id),
        verdict: None,
        notices: Vec::new(),
        meta: activation_meta.clone(),
    };
    store.insert_activation(txn, activation.clone()).await?;
    Ok(activation)
}

// ── Resolving an activation ──────────────────────────────────────────

/// Resolve an activation with a verdict and notices.
///
/// Completes the backing `activation` work item and marks the round
/// active. When no sibling activation remains open, the backing
/// `circulation` work item completes too, which fires the
/// after-circulation follow-ups.
#[allow(clippy::too_many_arguments)]
pub async fn complete_activation<S: CaseStore>(
    registry: &DynamicTaskRegistry,
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    actor: &Actor,
    activation_id: &str,
    verdict: Option<String>,
    notices: Vec<Notice>,
) -> Result<Activation, EngineError> {
    let mut activation = store.get_activation_for_update(txn, activation_id).await?;
    if !activation.state.is_open() {
        return Err(EngineError::validation(format!(
            "activation {} is already resolved",
            activation.id
        )));
    }
    activation.state = ActivationState::Done;
    activation.ended_at = Some(clock::now_rfc3339());
    if verdict.is_some() {
        activation.verdict = verdict;
    }
    activation.notices.extend(notices);
    store.update_activation(txn, activation.clone()).await?;

    mark_circulation_active(store, txn, &activation.case_id, &activation.circulation_id).await?;

    if let Some(item_id) = activation.work_item_id.clone() {
        let item = store.get_work_item_for_update(txn, &item_id).await?;
        if item.is_ready() {
            dynamic_tasks::complete_work_item(registry, store, txn, config, actor, &item_id)
                .await?;
        }
    }

    let open = store
        .activations_for_circulation(txn, &activation.circulation_id)
        .await?
        .iter()
        .filter(|a| a.state.is_open())
        .count();
    if open == 0 {
        if let Some(item) =
            circulation_work_item(store, txn, &activation.case_id, &activation.circulation_id)
                .await?
        {
            dynamic_tasks::complete_work_item(registry, store, txn, config, actor, &item.id)
                .await?;
        }
    }

    store
        .append_history(
            txn,
            &activation.case_id,
            &actor.username,
            actor.service(),
            &format!("Service {} completed its review", activation.service_id),
        )
        .await?;
    Ok(activation)
}

async fn mark_circulation_active<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    case_id: &str,
    circulation_id: &str,
) -> Result<(), EngineError> {
    let circulations = store.circulations_for_case(txn, case_id).await?;
    if let Some(mut circulation) = circulations.into_iter().find(|c| c.id == circulation_id) {
        if !circulation.has_activity {
            circulation.has_activity = true;
            store.update_circulation(txn, circulation).await?;
        }
    }
    Ok(())
}

/// The still-ready backing `circulation` work item of a round, if any.
pub async fn circulation_work_item<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    case_id: &str,
    circulation_id: &str,
) -> Result<Option<WorkItem>, EngineError> {
    let items = store.work_items_for_case(txn, case_id).await?;
    Ok(items.into_iter().find(|w| {
        w.task_id == labels::TASK_CIRCULATION
            && w.is_ready()
            && w.meta.get(labels::META_CIRCULATION_ID).and_then(|v| v.as_str())
                == Some(circulation_id)
    }))
}

// ── Responsibility handover ──────────────────────────────────────────

/// Reconciles work-item group assignments after a responsibility
/// handover. The orchestrator re-homes activations itself; everything
/// else the backing store knows about groups goes through this seam.
#[async_trait]
pub trait WorkItemReassigner<S: CaseStore>: Send + Sync {
    async fn reassign(
        &self,
        store: &S,
        txn: &mut S::Txn,
        case_id: &str,
        from: &str,
        to: &str,
    ) -> Result<usize, EngineError>;
}

/// Default reconciliation: rewrite `from` to `to` in the addressed and
/// controlling groups of every still-ready work item.
pub struct GroupReassigner;

#[async_trait]
impl<S: CaseStore> WorkItemReassigner<S> for GroupReassigner {
    async fn reassign(
        &self,
        store: &S,
        txn: &mut S::Txn,
        case_id: &str,
        from: &str,
        to: &str,
    ) -> Result<usize, EngineError> {
        let items = store.work_items_for_case(txn, case_id).await?;
        let mut touched = 0;
        for mut item in items {
            if !item.is_ready() {
                continue;
            }
            let mut changed = false;
            if item.addressed_groups.remove(from) {
                item.addressed_groups.insert(to.to_string());
                changed = true;
            }
            if item.controlling_groups.remove(from) {
                item.controlling_groups.insert(to.to_string());
                changed = true;
            }
            if changed {
                store.update_work_item(txn, item).await?;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

/// Outcome of [`reassign_responsible_service`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReassignmentReport {
    pub moved_activations: usize,
    pub deleted_circulations: usize,
    pub retained_circulations: usize,
}

/// Move every activation coordinated by `from` under `to`.
///
/// Moved activations re-home into the newest circulation originated by
/// `to` that still has activations; a fresh round is created when none
/// qualifies. A round left empty has its backing work item skipped
/// first, then the row is deleted unless it recorded activity. Outside
/// the configured reassignment states this is a no-op, not an error.
#[allow(clippy::too_many_arguments)]
pub async fn reassign_responsible_service<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    config: &EngineConfig,
    actor: &Actor,
    case_id: &str,
    from: &str,
    to: &str,
    reassigner: &dyn WorkItemReassigner<S>,
) -> Result<ReassignmentReport, EngineError> {
    let case = store.get_case_for_update(txn, case_id).await?;
    let mut report = ReassignmentReport::default();
    if !config
        .circulation
        .reassignment_states
        .iter()
        .any(|s| s == &case.state)
    {
        debug!(case = case_id, state = %case.state, "state not eligible, skipping reassignment");
        return Ok(report);
    }
    store.get_service(from).await?;
    store.get_service(to).await?;

    reassigner.reassign(store, txn, case_id, from, to).await?;

    let circulations = store.circulations_for_case(txn, case_id).await?;
    let mut target_id: Option<String> = None;
    for circulation in circulations.iter().rev() {
        if circulation.service_id == to
            && !store
                .activations_for_circulation(txn, &circulation.id)
                .await?
                .is_empty()
        {
            target_id = Some(circulation.id.clone());
            break;
        }
    }

    let mut emptied: Vec<String> = Vec::new();
    for circulation in &circulations {
        let activations = store.activations_for_circulation(txn, &circulation.id).await?;
        let total = activations.len();
        let mut moved_out = 0;
        for mut activation in activations {
            if activation.service_parent_id != from {
                continue;
            }
            let destination = match &target_id {
                Some(id) => id.clone(),
                None => {
                    let shell = create_circulation_row(store, txn, config, case_id, to).await?;
                    target_id = Some(shell.id.clone());
                    shell.id
                }
            };
            activation.service_parent_id = to.to_string();
            if activation.circulation_id != destination {
                activation.circulation_id = destination;
                moved_out += 1;
            }
            store.update_activation(txn, activation).await?;
            report.moved_activations += 1;
        }
        if moved_out > 0 && moved_out == total {
            emptied.push(circulation.id.clone());
        }
    }

    for circulation_id in emptied {
        if let Some(item) = circulation_work_item(store, txn, case_id, &circulation_id).await? {
            dynamic_tasks::skip_work_item(store, txn, actor, &item.id).await?;
        }
        let circulations = store.circulations_for_case(txn, case_id).await?;
        let Some(circulation) = circulations.into_iter().find(|c| c.id == circulation_id) else {
            continue;
        };
        if circulation.has_activity {
            report.retained_circulations += 1;
        } else {
            store.delete_circulation(txn, &circulation_id).await?;
            report.deleted_circulations += 1;
        }
    }

    if report.moved_activations > 0 {
        store
            .append_history(
                txn,
                case_id,
                &actor.username,
                actor.service(),
                &format!(
                    "Moved {} reviews from {} to {}",
                    report.moved_activations, from, to
                ),
            )
            .await?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::model::{Case, CaseStatus, NoticeKind, Service, ServiceLink};
    use docket_store::MemoryStore;

    fn make_actor(service: &str) -> Actor {
        Actor {
            username: "clerk".into(),
            role: "municipality".into(),
            service_id: Some(service.into()),
            groups: vec![service.into()],
            token: None,
        }
    }

    fn make_case(id: &str, state: &str, lead: &str) -> Case {
        Case {
            id: id.into(),
            status: CaseStatus::Running,
            workflow: "building-permit".into(),
            state: state.into(),
            document_id: format!("doc-{}", id),
            meta: Meta::new(),
            services: vec![ServiceLink {
                service_id: lead.into(),
                active: true,
            }],
            created_at: clock::now_rfc3339(),
        }
    }

    fn make_service(id: &str) -> Service {
        Service {
            id: id.into(),
            name: format!("Service {}", id),
            email: None,
            parent_id: None,
            disabled: false,
        }
    }

    async fn seed(store: &MemoryStore, case: Case, services: &[&str]) {
        let mut txn = store.begin().await.unwrap();
        store.insert_case(&mut txn, case).await.unwrap();
        for id in services {
            store.insert_service(&mut txn, make_service(id)).await.unwrap();
        }
        store.commit(txn).await.unwrap();
    }

    #[tokio::test]
    async fn zero_targets_create_nothing() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let actor = make_actor("svc-lead");
        seed(&store, make_case("case-1", "circulation", "svc-lead"), &["svc-lead"]).await;

        let mut txn = store.begin().await.unwrap();
        let opened = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-lead",
            &[],
            &Meta::new(),
        )
        .await
        .unwrap();
        assert!(opened.is_none());
        store.commit(txn).await.unwrap();

        assert!(store.list_circulations("case-1").await.unwrap().is_empty());
        assert!(store.list_work_items("case-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn opening_creates_round_with_backing_items() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let actor = make_actor("svc-lead");
        seed(
            &store,
            make_case("case-1", "circulation", "svc-lead"),
            &["svc-lead", "svc-fire", "svc-water"],
        )
        .await;

        let mut txn = store.begin().await.unwrap();
        let circulation = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-lead",
            &["svc-fire".to_string(), "svc-water".to_string()],
            &Meta::new(),
        )
        .await
        .unwrap()
        .unwrap();
        store.commit(txn).await.unwrap();

        assert!(circulation.name.starts_with("Circulation of "));
        let items = store.list_work_items("case-1").await.unwrap();
        let circulation_items: Vec<_> =
            items.iter().filter(|w| w.task_id == "circulation").collect();
        assert_eq!(circulation_items.len(), 1);
        assert_eq!(
            circulation_items[0]
                .meta
                .get("circulation-id")
                .and_then(|v| v.as_str()),
            Some(circulation.id.as_str())
        );
        assert!(circulation_items[0].deadline.is_some());
        assert_eq!(items.iter().filter(|w| w.task_id == "activation").count(), 2);

        let mut txn = store.begin().await.unwrap();
        let activations = store
            .activations_for_circulation(&mut txn, &circulation.id)
            .await
            .unwrap();
        store.abort(txn).await.unwrap();
        assert_eq!(activations.len(), 2);
        assert!(activations.iter().all(|a| a.state == ActivationState::Pending));
        assert!(activations.iter().all(|a| a.service_parent_id == "svc-lead"));
        assert!(activations.iter().all(|a| a.work_item_id.is_some()));
    }

    #[tokio::test]
    async fn unknown_target_service_is_not_found() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let actor = make_actor("svc-lead");
        seed(&store, make_case("case-1", "circulation", "svc-lead"), &["svc-lead"]).await;

        let mut txn = store.begin().await.unwrap();
        let err = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-lead",
            &["svc-ghost".to_string()],
            &Meta::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        store.abort(txn).await.unwrap();
        assert!(store.list_circulations("case-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fan_in_completes_backing_item_after_last_activation() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let registry = DynamicTaskRegistry::standard();
        let actor = make_actor("svc-lead");
        seed(
            &store,
            make_case("case-1", "circulation", "svc-lead"),
            &["svc-lead", "svc-fire", "svc-water"],
        )
        .await;

        let mut txn = store.begin().await.unwrap();
        let circulation = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-lead",
            &["svc-fire".to_string(), "svc-water".to_string()],
            &Meta::new(),
        )
        .await
        .unwrap()
        .unwrap();
        let activations = store
            .activations_for_circulation(&mut txn, &circulation.id)
            .await
            .unwrap();

        complete_activation(
            &registry,
            &store,
            &mut txn,
            &config,
            &actor,
            &activations[0].id,
            Some("no objections".to_string()),
            vec![],
        )
        .await
        .unwrap();
        let backing = circulation_work_item(&store, &mut txn, "case-1", &circulation.id)
            .await
            .unwrap();
        assert!(backing.is_some(), "round must stay open with one review left");

        complete_activation(
            &registry,
            &store,
            &mut txn,
            &config,
            &actor,
            &activations[1].id,
            None,
            vec![Notice {
                kind: NoticeKind::AncillaryClause,
                text: "install retention basin".to_string(),
            }],
        )
        .await
        .unwrap();
        let backing = circulation_work_item(&store, &mut txn, "case-1", &circulation.id)
            .await
            .unwrap();
        assert!(backing.is_none(), "backing item completes with the last review");
        store.commit(txn).await.unwrap();

        // Completion fired the after-circulation follow-ups.
        let items = store.list_work_items("case-1").await.unwrap();
        let ready: Vec<&str> = items
            .iter()
            .filter(|w| w.is_ready())
            .map(|w| w.task_id.as_str())
            .collect();
        assert_eq!(
            ready,
            vec!["start-circulation", "check-activation", "start-decision"]
        );
        let circulations = store.list_circulations("case-1").await.unwrap();
        assert!(circulations[0].has_activity);
    }

    #[tokio::test]
    async fn completing_backing_item_with_open_reviews_fails() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let registry = DynamicTaskRegistry::standard();
        let actor = make_actor("svc-lead");
        seed(
            &store,
            make_case("case-1", "circulation", "svc-lead"),
            &["svc-lead", "svc-fire"],
        )
        .await;

        let mut txn = store.begin().await.unwrap();
        let circulation = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-lead",
            &["svc-fire".to_string()],
            &Meta::new(),
        )
        .await
        .unwrap()
        .unwrap();
        let backing = circulation_work_item(&store, &mut txn, "case-1", &circulation.id)
            .await
            .unwrap()
            .unwrap();
        let err = dynamic_tasks::complete_work_item(
            &registry,
            &store,
            &mut txn,
            &config,
            &actor,
            &backing.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn resolved_activation_cannot_complete_again() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let registry = DynamicTaskRegistry::standard();
        let actor = make_actor("svc-lead");
        seed(
            &store,
            make_case("case-1", "circulation", "svc-lead"),
            &["svc-lead", "svc-fire"],
        )
        .await;

        let mut txn = store.begin().await.unwrap();
        let circulation = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-lead",
            &["svc-fire".to_string()],
            &Meta::new(),
        )
        .await
        .unwrap()
        .unwrap();
        let activations = store
            .activations_for_circulation(&mut txn, &circulation.id)
            .await
            .unwrap();
        complete_activation(
            &registry,
            &store,
            &mut txn,
            &config,
            &actor,
            &activations[0].id,
            None,
            vec![],
        )
        .await
        .unwrap();
        let err = complete_activation(
            &registry,
            &store,
            &mut txn,
            &config,
            &actor,
            &activations[0].id,
            None,
            vec![],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn reassignment_rehomes_reviews_and_drops_empty_round() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let actor = make_actor("svc-new");
        seed(
            &store,
            make_case("case-1", "circulation", "svc-old"),
            &["svc-old", "svc-new", "svc-fire"],
        )
        .await;

        let mut txn = store.begin().await.unwrap();
        let circulation = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-old",
            &["svc-fire".to_string()],
            &Meta::new(),
        )
        .await
        .unwrap()
        .unwrap();
        store.commit(txn).await.unwrap();

        let mut txn = store.begin().await.unwrap();
        let report = reassign_responsible_service(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-old",
            "svc-new",
            &GroupReassigner,
        )
        .await
        .unwrap();
        store.commit(txn).await.unwrap();

        assert_eq!(report.moved_activations, 1);
        assert_eq!(report.deleted_circulations, 1);
        assert_eq!(report.retained_circulations, 0);

        let circulations = store.list_circulations("case-1").await.unwrap();
        assert_eq!(circulations.len(), 1);
        assert_eq!(circulations[0].service_id, "svc-new");
        assert_ne!(circulations[0].id, circulation.id);

        let mut txn = store.begin().await.unwrap();
        let activations = store
            .activations_for_circulation(&mut txn, &circulations[0].id)
            .await
            .unwrap();
        store.abort(txn).await.unwrap();
        assert_eq!(activations.len(), 1);
        assert_eq!(activations[0].service_parent_id, "svc-new");

        // The old round's backing item was skipped, the new round has its own.
        let items = store.list_work_items("case-1").await.unwrap();
        let statuses: Vec<WorkItemStatus> = items
            .iter()
            .filter(|w| w.task_id == "circulation")
            .map(|w| w.status)
            .collect();
        assert!(statuses.contains(&WorkItemStatus::Skipped));
        assert!(statuses.contains(&WorkItemStatus::Ready));
    }

    #[tokio::test]
    async fn reassignment_retains_round_with_recorded_activity() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let registry = DynamicTaskRegistry::standard();
        let actor = make_actor("svc-new");
        seed(
            &store,
            make_case("case-1", "circulation", "svc-old"),
            &["svc-old", "svc-new", "svc-fire", "svc-water"],
        )
        .await;

        // One of two reviews resolves, so the round has activity.
        let mut txn = store.begin().await.unwrap();
        let circulation = open_circulation(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-old",
            &["svc-fire".to_string(), "svc-water".to_string()],
            &Meta::new(),
        )
        .await
        .unwrap()
        .unwrap();
        let activations = store
            .activations_for_circulation(&mut txn, &circulation.id)
            .await
            .unwrap();
        complete_activation(
            &registry,
            &store,
            &mut txn,
            &config,
            &actor,
            &activations[0].id,
            None,
            vec![],
        )
        .await
        .unwrap();
        store.commit(txn).await.unwrap();

        let mut txn = store.begin().await.unwrap();
        let report = reassign_responsible_service(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-old",
            "svc-new",
            &GroupReassigner,
        )
        .await
        .unwrap();
        store.commit(txn).await.unwrap();

        // Both reviews move, resolved ones included; the emptied round
        // stays because a verdict was recorded in it.
        assert_eq!(report.moved_activations, 2);
        assert_eq!(report.deleted_circulations, 0);
        assert_eq!(report.retained_circulations, 1);
        let circulations = store.list_circulations("case-1").await.unwrap();
        assert_eq!(circulations.len(), 2);
    }

    #[tokio::test]
    async fn reassignment_outside_eligible_states_is_a_noop() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let actor = make_actor("svc-new");
        seed(
            &store,
            make_case("case-1", "Finished", "svc-old"),
            &["svc-old", "svc-new"],
        )
        .await;

        let mut txn = store.begin().await.unwrap();
        let report = reassign_responsible_service(
            &store,
            &mut txn,
            &config,
            &actor,
            "case-1",
            "svc-old",
            "svc-new",
            &GroupReassigner,
        )
        .await
        .unwrap();
        store.commit(txn).await.unwrap();
        assert_eq!(report, ReassignmentReport::default());
    }
}
