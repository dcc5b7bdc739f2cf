//! The engine-wide error taxonomy.
//!
//! Five caller-visible classes plus a store passthrough. Handlers never
//! retry; whether a caller retries is its own policy. Permission denials
//! carry the reason text shown to the requester.

/// All errors surfaced by the engine and protocol layers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or semantically invalid input. No state change.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A permission predicate evaluated false. Fail-closed, no state change.
    #[error("permission denied: {reason}")]
    Permission { reason: String },

    /// A referenced case, message, attachment, service or event is unknown.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Ambiguous envelope or an unresolvable cross-reference during an
    /// otherwise-permitted apply.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The legacy ACL collaborator returned a malformed or explicit-error
    /// payload. Fatal for the call; never silently mapped to deny or allow.
    #[error("upstream error: {message}")]
    Upstream { message: String },

    /// A store-level failure (conflict, backend error) with no more
    /// specific classification.
    #[error("store error: {message}")]
    Store { message: String },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
        }
    }

    pub fn permission(reason: impl Into<String>) -> Self {
        EngineError::Permission {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        EngineError::Protocol {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        EngineError::Upstream {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        EngineError::Store {
            message: message.into(),
        }
    }
}
