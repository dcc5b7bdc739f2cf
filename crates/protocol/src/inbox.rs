//! Per-service message queues over the store inbox.
//!
//! Messages append inside the emitting handler's unit of work and are
//! polled forward with a client-persisted cursor: no qualifying message
//! is reported as not-found and the poller retries later.

use docket_core::model::Message;
use docket_core::{Actor, EngineError};
use docket_store::CaseStore;

use crate::envelope::DeliveryEnvelope;

/// Queue an envelope for a receiver, inside the caller's unit of work.
pub async fn deliver<S: CaseStore>(
    store: &S,
    txn: &mut S::Txn,
    receiver_id: &str,
    envelope: &DeliveryEnvelope,
) -> Result<Message, EngineError> {
    let body = envelope.to_json()?;
    Ok(store.append_message(txn, receiver_id, body).await?)
}

/// The next queued message for the actor's service.
///
/// `last` is the id of the last message the poller consumed; absent, the
/// oldest message qualifies. Unknown cursors and an exhausted queue both
/// surface as not-found.
pub async fn next_for<S: CaseStore>(
    store: &S,
    actor: &Actor,
    last: Option<u64>,
) -> Result<Message, EngineError> {
    let service = actor
        .service()
        .ok_or_else(|| EngineError::permission("polling requires a service affiliation"))?;
    Ok(store.next_message(service, last).await?)
}
