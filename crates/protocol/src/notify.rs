//! Outbound notification seam.
//!
//! Handlers dispatch acknowledgments only after their unit of work has
//! committed; a failed dispatch is logged and never rolls anything back.

use std::sync::Mutex;

use tracing::info;

use docket_core::model::{Case, Service};
use docket_core::EngineError;

/// Dispatches a templated notification to a service about a case.
pub trait Notifier: Send + Sync {
    fn send(&self, template: &str, recipient: &Service, case: &Case) -> Result<(), EngineError>;
}

/// Default dispatcher: logs the notification instead of mailing it.
/// Deployments wire a real mailer behind the same trait.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, template: &str, recipient: &Service, case: &Case) -> Result<(), EngineError> {
        info!(
            template,
            service = %recipient.id,
            email = recipient.email.as_deref().unwrap_or("-"),
            case = %case.id,
            "notification dispatched"
        );
        Ok(())
    }
}

/// One recorded dispatch, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub template: String,
    pub service_id: String,
    pub case_id: String,
}

/// Test double that records dispatches, optionally failing every one.
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A notifier whose every dispatch fails, for exercising the
    /// best-effort path.
    pub fn failing() -> Self {
        RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, template: &str, recipient: &Service, case: &Case) -> Result<(), EngineError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentNotification {
                template: template.to_string(),
                service_id: recipient.id.clone(),
                case_id: case.id.clone(),
            });
        }
        if self.fail {
            return Err(EngineError::upstream("notification channel down"));
        }
        Ok(())
    }
}
