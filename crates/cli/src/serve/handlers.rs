//! HTTP route handlers for the exchange surface.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;

use docket_core::model::Meta;
use docket_core::{Actor, EngineError};
use docket_engine::RequestScope;
use docket_protocol::{base_delivery_for, DeliveryEnvelope};
use docket_store::CaseStore;

use super::state::AppState;
use super::{engine_error_response, json_error};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// POST /send — apply one inbound envelope.
pub(crate) async fn handle_send_envelope(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(envelope): Json<DeliveryEnvelope>,
) -> Response {
    match docket_protocol::handle_send(
        state.store.as_ref(),
        &state.config,
        &state.registry,
        &state.notifier,
        &actor,
        &envelope,
    )
    .await
    {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => engine_error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageQuery {
    last: Option<u64>,
}

/// Response header carrying the polling cursor for the returned message.
pub(crate) const MESSAGE_ID_HEADER: &str = "x-docket-message-id";

/// GET /message?last= — next queued envelope for the caller's service.
///
/// The stored body is returned verbatim; it was serialized at delivery
/// time and re-rendering could disagree with what the partner saw. The
/// cursor for the next poll travels in `x-docket-message-id`.
pub(crate) async fn handle_next_message(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<MessageQuery>,
) -> Response {
    match docket_protocol::next_for(state.store.as_ref(), &actor, query.last).await {
        Ok(message) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (
                    HeaderName::from_static(MESSAGE_ID_HEADER),
                    message.id.to_string(),
                ),
            ],
            message.body,
        )
            .into_response(),
        Err(err) => engine_error_response(&err),
    }
}

/// POST /event/{case_id}/{event_type} — fire one named event.
pub(crate) async fn handle_fire_event(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path((case_id, event_type)): Path<(String, String)>,
    Json(context): Json<Meta>,
) -> Response {
    match docket_protocol::handle_event(
        state.store.as_ref(),
        &state.config,
        &actor,
        &case_id,
        &event_type,
        &context,
    )
    .await
    {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => engine_error_response(&err),
    }
}

/// GET /application/{case_id} — the dossier rendered as its delivery
/// envelope, scoped to what the caller may see.
pub(crate) async fn handle_application(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(case_id): Path<String>,
) -> Response {
    match render_application(&state, &actor, &case_id).await {
        Ok(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        Err(err) => engine_error_response(&err),
    }
}

async fn render_application(
    state: &AppState,
    actor: &Actor,
    case_id: &str,
) -> Result<DeliveryEnvelope, EngineError> {
    let mut scope = RequestScope::new();
    // An invisible case reads as missing; existence is not leaked.
    if !state.gate.case_visible(actor, &mut scope, case_id).await? {
        return Err(EngineError::not_found("case", case_id));
    }
    let case = state.store.get_case(case_id).await?;
    let decisions = state.store.list_decisions(case_id).await?;
    let attachments = state.store.attachments_for_case(case_id).await?;
    Ok(base_delivery_for(&state.config, &case, &decisions, &attachments))
}
