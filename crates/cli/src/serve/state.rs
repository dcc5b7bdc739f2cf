//! Shared server state.

use std::sync::Arc;

use docket_core::EngineConfig;
use docket_engine::{DynamicTaskRegistry, VisibilityGate};
use docket_protocol::TracingNotifier;
use docket_store::MemoryStore;

/// Application state shared across request handlers.
pub(crate) struct AppState {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) registry: DynamicTaskRegistry,
    pub(crate) notifier: TracingNotifier,
    /// Case visibility, backed by the legacy ACL service.
    pub(crate) gate: VisibilityGate<MemoryStore>,
}
