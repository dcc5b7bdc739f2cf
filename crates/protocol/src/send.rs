//! Inbound envelope handlers.
//!
//! [`handle_send`] resolves the envelope's single payload and applies
//! it: permission predicate against committed state, then the mutation
//! in one store unit of work with its Message emission and history
//! entry. The only post-commit side effect is the task handler's
//! acknowledgment dispatch, which is best-effort.

use serde_json::Value;
use tracing::warn;

use docket_core::clock;
use docket_core::labels;
use docket_core::model::{
    CaseStatus, DecisionRecord, Judgement, Meta, Notice, NoticeKind, ServiceLink,
};
use docket_core::{Actor, EngineConfig, EngineError};
use docket_engine::circulation::{
    add_activation, complete_activation, open_circulation, open_empty_circulation,
    reassign_responsible_service, GroupReassigner,
};
use docket_engine::dynamic_tasks::{self, DynamicTaskRegistry};
use docket_store::{CaseStore, StoreError};

use crate::envelope::{
    self, AccompanyingReport, ChangeResponsibility, CloseDossier, DeliveryEnvelope,
    DocumentDescriptor, InboundEvent, KindOfProceedings, NoticeRuling, TaskDirective,
};
use crate::inbox;
use crate::notify::Notifier;

/// Apply one inbound envelope on behalf of `actor`.
pub async fn handle_send<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    registry: &DynamicTaskRegistry,
    notifier: &dyn Notifier,
    actor: &Actor,
    envelope: &DeliveryEnvelope,
) -> Result<(), EngineError> {
    match envelope::resolve_event(envelope)? {
        InboundEvent::NoticeRuling(payload) => {
            apply_notice_ruling(store, config, registry, actor, payload).await
        }
        InboundEvent::KindOfProceedings(payload) => {
            apply_kind_of_proceedings(store, config, actor, payload).await
        }
        InboundEvent::Task(payload) => apply_task(store, config, notifier, actor, payload).await,
        InboundEvent::ChangeResponsibility(payload) => {
            apply_change_responsibility(store, config, actor, payload).await
        }
        InboundEvent::CloseDossier(payload) => {
            apply_close_dossier(store, config, actor, payload).await
        }
        InboundEvent::AccompanyingReport(payload) => {
            apply_accompanying_report(store, config, registry, actor, payload).await
        }
    }
}

// ── Notice ruling ────────────────────────────────────────────────────

/// Record the authority's ruling. A declined judgement rejects the
/// dossier; any other moves it to the workflow's configured next phase
/// and fires the after-decision follow-up, through the open `decision`
/// work item when one exists.
async fn apply_notice_ruling<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    registry: &DynamicTaskRegistry,
    actor: &Actor,
    payload: &NoticeRuling,
) -> Result<(), EngineError> {
    let case = store.get_case(&payload.case_id).await?;
    let requester = actor
        .service()
        .ok_or_else(|| EngineError::permission("rulings require a service affiliation"))?;
    if case.active_service() != Some(requester) {
        return Err(EngineError::permission(
            "only the leading authority may record a ruling",
        ));
    }
    if !config.lifecycle.is_review_state(&case.state) {
        return Err(EngineError::permission(format!(
            "state '{}' does not accept rulings",
            case.state
        )));
    }
    // Formal review can only turn a dossier down; every other verdict
    // belongs to the later review phases.
    if case.state == labels::STATE_DOSSIER_REVIEW && payload.judgement != Judgement::Declined {
        return Err(EngineError::validation(
            "only a declined ruling is valid during formal review",
        ));
    }
    let next_state = if payload.judgement == Judgement::Declined {
        config.lifecycle.rejected_state.clone()
    } else {
        config
            .lifecycle
            .granted_state_for(&case.workflow)
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "workflow '{}' has no granted ruling target",
                    case.workflow
                ))
            })?
    };

    let mut txn = store.begin().await?;
    let mut case = store.get_case_for_update(&mut txn, &payload.case_id).await?;
    let decision_id = store.mint_id(&mut txn, "decision").await?;
    store
        .insert_decision(
            &mut txn,
            DecisionRecord {
                id: decision_id,
                case_id: case.id.clone(),
                judgement: payload.judgement,
                authority_id: Some(requester.to_string()),
                ruling_date: payload.ruling_date.clone(),
                created_at: clock::now_rfc3339(),
            },
        )
        .await?;
    case.state = next_state.clone();
    store.update_case(&mut txn, case.clone()).await?;
    share_documents(store, &mut txn, &case.id, &payload.documents).await?;

    let open_decision = store
        .work_items_for_case(&mut txn, &case.id)
        .await?
        .into_iter()
        .find(|w| w.is_ready() && w.task_id == labels::TASK_DECISION);
    match open_decision {
        Some(item) => {
            dynamic_tasks::complete_work_item(registry, store, &mut txn, config, actor, &item.id)
                .await?;
        }
        None => {
            dynamic_tasks::fire_milestone(
                registry,
                store,
                &mut txn,
                config,
                actor,
                &case.id,
                labels::MILESTONE_AFTER_DECISION,
                None,
                &Meta::new(),
            )
            .await?;
        }
    }

    store
        .append_history(
            &mut txn,
            &case.id,
            &actor.username,
            actor.service(),
            &format!(
                "Ruling recorded with judgement {}; dossier moved to '{}'",
                payload.judgement.code(),
                next_state
            ),
        )
        .await?;
    let confirmation = envelope::status_notification_for(config, &case);
    inbox::deliver(store, &mut txn, requester, &confirmation).await?;
    store.commit(txn).await?;
    Ok(())
}

// ── Kind of proceedings ──────────────────────────────────────────────

/// Determine the proceedings: open the circulation phase with an empty
/// round the responsible service fills with invitations.
async fn apply_kind_of_proceedings<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    actor: &Actor,
    payload: &KindOfProceedings,
) -> Result<(), EngineError> {
    let case = store.get_case(&payload.case_id).await?;
    if !config.lifecycle.is_early_process_state(&case.state) {
        return Err(EngineError::permission(format!(
            "state '{}' does not accept a kind-of-proceedings notice",
            case.state
        )));
    }
    let originating = case
        .active_service()
        .map(str::to_string)
        .ok_or_else(|| EngineError::validation("case has no responsible service"))?;

    let mut txn = store.begin().await?;
    let round =
        open_empty_circulation(store, &mut txn, config, &payload.case_id, &originating).await?;
    let mut case = store.get_case_for_update(&mut txn, &payload.case_id).await?;
    case.state = config.lifecycle.circulation_state.clone();
    store.update_case(&mut txn, case.clone()).await?;
    share_documents(store, &mut txn, &case.id, &payload.documents).await?;
    store
        .append_history(
            &mut txn,
            &case.id,
            &actor.username,
            actor.service(),
            &format!(
                "Proceedings determined; circulation '{}' opened",
                round.name
            ),
        )
        .await?;
    let notification = envelope::status_notification_for(config, &case);
    inbox::deliver(store, &mut txn, &originating, &notification).await?;
    store.commit(txn).await?;
    Ok(())
}

// ── Task ─────────────────────────────────────────────────────────────

/// Involve a service on instruction of a partner system: an activation
/// in the case's newest round (or a fresh one), the invitation message,
/// and an acknowledgment once committed.
async fn apply_task<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    notifier: &dyn Notifier,
    actor: &Actor,
    payload: &TaskDirective,
) -> Result<(), EngineError> {
    if actor.is_anonymous() {
        return Err(EngineError::permission(
            "anonymous requesters cannot assign tasks",
        ));
    }
    let template = config
        .notifications
        .task_template
        .as_deref()
        .ok_or_else(|| {
            EngineError::validation("no acknowledgment template configured for protocol tasks")
        })?;
    let service = match store.get_service(&payload.service_id).await {
        Ok(service) => service,
        Err(StoreError::RowNotFound { .. }) => {
            return Err(EngineError::validation(format!(
                "unknown service id '{}'",
                payload.service_id
            )));
        }
        Err(err) => return Err(err.into()),
    };
    let case = store.get_case(&payload.case_id).await?;
    let originating = case
        .active_service()
        .or(actor.service())
        .map(str::to_string)
        .ok_or_else(|| EngineError::validation("case has no responsible service"))?;

    let mut activation_meta = Meta::new();
    activation_meta.insert(labels::META_ECH_MESSAGE_CREATED.to_string(), Value::Bool(true));

    let mut txn = store.begin().await?;
    let newest = store.circulations_for_case(&mut txn, &case.id).await?.pop();
    let mut activation = match newest {
        Some(round) => {
            add_activation(store, &mut txn, config, &round, &service.id, &activation_meta).await?
        }
        None => {
            let round = open_circulation(
                store,
                &mut txn,
                config,
                actor,
                &case.id,
                &originating,
                &[service.id.clone()],
                &activation_meta,
            )
            .await?
            .ok_or_else(|| EngineError::store("circulation missing after opening"))?;
            let mut activations = store.activations_for_circulation(&mut txn, &round.id).await?;
            activations
                .pop()
                .ok_or_else(|| EngineError::store("activation missing after opening"))?
        }
    };
    if let Some(deadline) = &payload.deadline {
        activation.deadline = Some(deadline.clone());
        store.update_activation(&mut txn, activation.clone()).await?;
        if let Some(item_id) = &activation.work_item_id {
            let mut item = store.get_work_item_for_update(&mut txn, item_id).await?;
            item.deadline = Some(deadline.clone());
            store.update_work_item(&mut txn, item).await?;
        }
    }
    store
        .append_history(
            &mut txn,
            &case.id,
            &actor.username,
            actor.service(),
            &format!("Invited {} by inter-agency task", service.name),
        )
        .await?;
    let decisions = store.list_decisions(&case.id).await?;
    let attachments = store.attachments_for_case(&case.id).await?;
    let delivery = envelope::base_delivery_for(config, &case, &decisions, &attachments);
    inbox::deliver(store, &mut txn, &service.id, &delivery).await?;
    store.commit(txn).await?;

    if let Err(err) = notifier.send(template, &service, &case) {
        warn!(case = %case.id, service = %service.id, %err, "acknowledgment dispatch failed");
    }
    Ok(())
}

// ── Change responsibility ────────────────────────────────────────────

/// Hand the case to a new responsible service, rehoming open reviews
/// where the lifecycle phase allows it. The service name resolves
/// before anything mutates.
async fn apply_change_responsibility<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    actor: &Actor,
    payload: &ChangeResponsibility,
) -> Result<(), EngineError> {
    if actor.is_anonymous() {
        return Err(EngineError::permission(
            "anonymous requesters cannot move responsibility",
        ));
    }
    let new_service = store
        .find_service_by_name(&payload.service_name)
        .await?
        .ok_or_else(|| {
            EngineError::protocol(format!("unknown service '{}'", payload.service_name))
        })?;
    let case = store.get_case(&payload.case_id).await?;
    let previous = case.active_service().map(str::to_string);

    let mut txn = store.begin().await?;
    let mut case = store.get_case_for_update(&mut txn, &payload.case_id).await?;
    for link in &mut case.services {
        link.active = link.service_id == new_service.id;
    }
    if !case.services.iter().any(|l| l.service_id == new_service.id) {
        case.services.push(ServiceLink {
            service_id: new_service.id.clone(),
            active: true,
        });
    }
    store.update_case(&mut txn, case.clone()).await?;

    if let Some(previous) = &previous {
        if previous != &new_service.id {
            reassign_responsible_service(
                store,
                &mut txn,
                config,
                actor,
                &case.id,
                previous,
                &new_service.id,
                &GroupReassigner,
            )
            .await?;
        }
    }

    store
        .append_history(
            &mut txn,
            &case.id,
            &actor.username,
            actor.service(),
            &match &previous {
                Some(previous) => format!(
                    "Responsibility moved from {} to {}",
                    previous, new_service.name
                ),
                None => format!("Responsibility assigned to {}", new_service.name),
            },
        )
        .await?;
    let decisions = store.list_decisions(&case.id).await?;
    let attachments = store.attachments_for_case(&case.id).await?;
    let delivery = envelope::base_delivery_for(config, &case, &decisions, &attachments);
    inbox::deliver(store, &mut txn, &new_service.id, &delivery).await?;
    store.commit(txn).await?;
    Ok(())
}

// ── Close dossier ────────────────────────────────────────────────────

/// Close and archive a dossier awaiting closure. Open work items are
/// canceled so the case can complete.
async fn apply_close_dossier<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    actor: &Actor,
    payload: &CloseDossier,
) -> Result<(), EngineError> {
    let case = store.get_case(&payload.case_id).await?;
    let requester = actor
        .service()
        .ok_or_else(|| EngineError::permission("closing requires a service affiliation"))?;
    let Some(active) = case.active_service() else {
        return Err(EngineError::permission("case has no responsible service"));
    };
    let permitted = if active == requester {
        true
    } else {
        // A control service subordinate to the leading authority may
        // close on its behalf, but only if it is involved in the case.
        case.services.iter().any(|l| l.service_id == requester)
            && store.get_service(requester).await?.parent_id.as_deref() == Some(active)
    };
    if !permitted {
        return Err(EngineError::permission(
            "only the leading authority or its control service may close the dossier",
        ));
    }
    if case.state != config.lifecycle.finish_pending_state {
        return Err(EngineError::permission(format!(
            "state '{}' does not allow closure",
            case.state
        )));
    }
    let receiver = active.to_string();

    let mut txn = store.begin().await?;
    let mut case = store.get_case_for_update(&mut txn, &payload.case_id).await?;
    dynamic_tasks::cancel_ready_work_items(store, &mut txn, actor, &case.id).await?;
    case.state = config.lifecycle.finished_state.clone();
    case.status = CaseStatus::Completed;
    store.update_case(&mut txn, case.clone()).await?;
    store
        .append_history(
            &mut txn,
            &case.id,
            &actor.username,
            actor.service(),
            "Dossier closed and archived",
        )
        .await?;
    let notification = envelope::status_notification_for(config, &case);
    inbox::deliver(store, &mut txn, &receiver, &notification).await?;
    store.commit(txn).await?;
    Ok(())
}

// ── Accompanying report ──────────────────────────────────────────────

/// A reviewing service files its report: notices and verdict land on
/// its open activation, which completes through the orchestrator so
/// round fan-in applies.
async fn apply_accompanying_report<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    registry: &DynamicTaskRegistry,
    actor: &Actor,
    payload: &AccompanyingReport,
) -> Result<(), EngineError> {
    let requester = actor
        .service()
        .ok_or_else(|| EngineError::permission("reports require a service affiliation"))?;
    let open = store
        .activations_for_service(requester)
        .await?
        .into_iter()
        .find(|a| a.case_id == payload.case_id && a.state.is_open())
        .ok_or_else(|| {
            EngineError::permission("no open review invitation for this service")
        })?;
    if payload.documents.is_empty() {
        return Err(EngineError::protocol(
            "accompanying report references no documents",
        ));
    }

    let mut txn = store.begin().await?;
    for descriptor in &payload.documents {
        let attachment = store.get_attachment_for_update(&mut txn, &descriptor.id).await?;
        if attachment.case_id != payload.case_id {
            return Err(EngineError::not_found("attachment", descriptor.id.clone()));
        }
    }
    let verdict = payload.judgement.map(|j| verdict_label(j).to_string());
    let mut notices: Vec<Notice> = payload
        .remarks
        .iter()
        .map(|text| Notice {
            kind: NoticeKind::Opinion,
            text: text.clone(),
        })
        .collect();
    notices.extend(payload.ancillary_clauses.iter().map(|text| Notice {
        kind: NoticeKind::AncillaryClause,
        text: text.clone(),
    }));
    let activation = complete_activation(
        registry, store, &mut txn, config, actor, &open.id, verdict, notices,
    )
    .await?;
    let case = store.get_case_for_update(&mut txn, &payload.case_id).await?;
    let notification = envelope::status_notification_for(config, &case);
    inbox::deliver(store, &mut txn, &activation.service_parent_id, &notification).await?;
    store.commit(txn).await?;
    Ok(())
}

fn verdict_label(judgement: Judgement) -> &'static str {
    match judgement {
        Judgement::Granted => "granted",
        Judgement::GrantedWithConditions => "granted-with-conditions",
        Judgement::PartiallyGranted => "partially-granted",
        Judgement::Declined => "declined",
    }
}

// ── Shared helpers ───────────────────────────────────────────────────

/// Move referenced attachments into the section shared with all
/// participants. An id that does not belong to the case is unknown.
async fn share_documents<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    case_id: &str,
    documents: &[DocumentDescriptor],
) -> Result<(), EngineError> {
    for descriptor in documents {
        let mut attachment = store.get_attachment_for_update(txn, &descriptor.id).await?;
        if attachment.case_id != case_id {
            return Err(EngineError::not_found("attachment", descriptor.id.clone()));
        }
        if attachment.sections.insert(labels::SECTION_SHARED_ALL.to_string()) {
            store.update_attachment(txn, attachment).await?;
        }
    }
    Ok(())
}
