//! `docket serve` -- the HTTP exchange server.
//!
//! Exposes the protocol surface over axum + tokio:
//! - POST /send                          - apply one inbound envelope
//! - GET  /message?last=<id>             - poll the caller's inbox
//! - POST /event/{case_id}/{event_type}  - fire a named internal event
//! - GET  /application/{case_id}         - dossier as delivery envelope
//! - GET  /health                        - liveness, no identity required
//!
//! Identity comes from trusted proxy headers resolved by the actor
//! middleware; requests without one are rejected with 401. Error bodies
//! are JSON `{"error": text}` with the taxonomy's status mapping.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use docket_core::{EngineConfig, EngineError};
use docket_engine::{AclClient, DynamicTaskRegistry, HttpAclClient, VisibilityGate};
use docket_protocol::TracingNotifier;
use docket_store::MemoryStore;

use self::handlers::{
    handle_application, handle_fire_event, handle_health, handle_next_message, handle_not_found,
    handle_send_envelope,
};
use self::state::AppState;
use crate::seed;

/// JSON error response body.
fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

/// The error taxonomy's HTTP status mapping.
fn engine_error_response(err: &EngineError) -> Response {
    let status = match err {
        EngineError::Validation { .. } | EngineError::Protocol { .. } => StatusCode::BAD_REQUEST,
        EngineError::Permission { .. } => StatusCode::FORBIDDEN,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        EngineError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, &err.to_string())
}

/// Start the server on `port`, seeding the in-memory store first.
pub(crate) async fn start_server(
    port: u16,
    config: EngineConfig,
    seed_paths: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    for path in &seed_paths {
        seed::load_into(store.as_ref(), path).await?;
    }

    let config = Arc::new(config);
    let acl: Arc<dyn AclClient> = Arc::new(HttpAclClient::new(config.acl.base_url.clone()));
    let gate = VisibilityGate::new(Arc::clone(&store), Arc::clone(&config), acl);
    let state = Arc::new(AppState {
        store,
        config,
        registry: DynamicTaskRegistry::standard(),
        notifier: TracingNotifier,
        gate,
    });

    // Permissive CORS; the fronting proxy is the real boundary.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/send", post(handle_send_envelope))
        .route("/message", get(handle_next_message))
        .route("/event/{case_id}/{event_type}", post(handle_fire_event))
        .route("/application/{case_id}", get(handle_application))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn(middleware::resolve_actor))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "docket exchange listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("received shutdown signal");
}
