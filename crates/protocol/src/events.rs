//! Named internal events.
//!
//! Events are fired by the surrounding application, not by partner
//! systems: intake confirms a submission, the workflow layer reports a
//! status change, the applicant withdraws. Each handler notifies the
//! affected services through the inbox and is invoked by name; the
//! builtin names are the `EVENT_*` constants.

use std::collections::BTreeSet;

use docket_core::labels;
use docket_core::model::{Case, CaseStatus, Meta};
use docket_core::{Actor, EngineConfig, EngineError};
use docket_engine::dynamic_tasks;
use docket_store::CaseStore;

use crate::envelope;
use crate::inbox;

pub const EVENT_SUBMITTED: &str = "submitted";
pub const EVENT_STATUS_CHANGED: &str = "status-changed";
pub const EVENT_WITHDRAWN: &str = "withdrawn";

/// Fire a named event for a case. Unknown names are not found; handler
/// failures surface as validation errors with the handler's message.
pub async fn handle_event<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    actor: &Actor,
    case_id: &str,
    event_type: &str,
    context: &Meta,
) -> Result<(), EngineError> {
    if actor.role != labels::ROLE_SUPPORT {
        return Err(EngineError::permission(
            "events are restricted to the support role",
        ));
    }
    match event_type {
        EVENT_SUBMITTED => apply_submitted(store, config, actor, case_id).await,
        EVENT_STATUS_CHANGED => apply_status_changed(store, config, case_id).await,
        EVENT_WITHDRAWN => apply_withdrawn(store, config, actor, case_id, context).await,
        _ => Err(EngineError::not_found("event", event_type)),
    }
}

/// Intake confirmed: the responsible service receives the full dossier
/// rendering.
async fn apply_submitted<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    actor: &Actor,
    case_id: &str,
) -> Result<(), EngineError> {
    let case = store.get_case(case_id).await?;
    let receiver = case
        .active_service()
        .map(str::to_string)
        .ok_or_else(|| EngineError::validation("case has no responsible service"))?;
    let decisions = store.list_decisions(case_id).await?;
    let attachments = store.attachments_for_case(case_id).await?;
    let delivery = envelope::base_delivery_for(config, &case, &decisions, &attachments);

    let mut txn = store.begin().await?;
    inbox::deliver(store, &mut txn, &receiver, &delivery).await?;
    store
        .append_history(
            &mut txn,
            case_id,
            &actor.username,
            actor.service(),
            "Dossier submitted",
        )
        .await?;
    store.commit(txn).await?;
    Ok(())
}

/// Everyone with a stake in the case hears about a status change.
async fn apply_status_changed<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    case_id: &str,
) -> Result<(), EngineError> {
    let case = store.get_case(case_id).await?;
    let notification = envelope::status_notification_for(config, &case);

    let mut txn = store.begin().await?;
    let receivers = involved_services(store, &mut txn, &case).await?;
    for receiver in &receivers {
        inbox::deliver(store, &mut txn, receiver, &notification).await?;
    }
    store.commit(txn).await?;
    Ok(())
}

/// The applicant withdrew: suspend the run, sweep open work items and
/// notify every involved service.
async fn apply_withdrawn<S: CaseStore>(
    store: &S,
    config: &EngineConfig,
    actor: &Actor,
    case_id: &str,
    context: &Meta,
) -> Result<(), EngineError> {
    let mut txn = store.begin().await?;
    let mut case = store.get_case_for_update(&mut txn, case_id).await?;
    case.status = CaseStatus::Suspended;
    store.update_case(&mut txn, case.clone()).await?;
    dynamic_tasks::cancel_ready_work_items(store, &mut txn, actor, case_id).await?;
    let entry = match context.get("reason").and_then(|v| v.as_str()) {
        Some(reason) => format!("Dossier withdrawn ({reason})"),
        None => "Dossier withdrawn".to_string(),
    };
    store
        .append_history(&mut txn, case_id, &actor.username, actor.service(), &entry)
        .await?;
    let notification = envelope::status_notification_for(config, &case);
    let receivers = involved_services(store, &mut txn, &case).await?;
    for receiver in &receivers {
        inbox::deliver(store, &mut txn, receiver, &notification).await?;
    }
    store.commit(txn).await?;
    Ok(())
}

/// Responsible-service links plus every invited review service.
async fn involved_services<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    case: &Case,
) -> Result<BTreeSet<String>, EngineError> {
    let mut involved: BTreeSet<String> =
        case.services.iter().map(|l| l.service_id.clone()).collect();
    for round in store.circulations_for_case(txn, &case.id).await? {
        for activation in store.activations_for_circulation(txn, &round.id).await? {
            involved.insert(activation.service_id);
        }
    }
    Ok(involved)
}
