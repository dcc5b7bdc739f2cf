//! Acting identity as resolved from the request edge.

use serde::{Deserialize, Serialize};

/// The identity a request acts under.
///
/// Resolved by the server from trusted proxy headers; the engine never
/// authenticates, it only authorizes. `token` is the raw `Authorization`
/// header value, passed through to the legacy ACL collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    /// Role slug; vocabulary comes from deployment config.
    pub role: String,
    /// The service the actor acts for. None for portal users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Actor {
    /// An actor without a service affiliation. Protocol send handlers that
    /// mutate cases refuse anonymous requesters.
    pub fn is_anonymous(&self) -> bool {
        self.service_id.is_none()
    }

    /// The service id, or a permission error message for handlers.
    pub fn service(&self) -> Option<&str> {
        self.service_id.as_deref()
    }
}
