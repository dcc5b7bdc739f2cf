use docket_core::EngineError;

/// All errors that can be returned by a CaseStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No row with the given id (or query key) exists.
    #[error("{kind} not found: {id}")]
    RowNotFound { kind: &'static str, id: String },

    /// An insert collided with an existing row id.
    #[error("{kind} already exists: {id}")]
    DuplicateRow { kind: &'static str, id: String },

    /// A backend-specific storage error (lock poisoning, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::RowNotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::DuplicateRow {
            kind,
            id: id.into(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RowNotFound { kind, id } => EngineError::NotFound { kind, id },
            other => EngineError::store(other.to_string()),
        }
    }
}
