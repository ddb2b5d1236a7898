use super::repository::RepositoryError;

/// Error surface shared by every aid-cycle manager.
///
/// `NotFound` and `InvalidState` are client-correctable and surfaced
/// synchronously; `TransactionFailure` means an atomic unit of work could not
/// commit and wraps the storage cause for operator diagnosis.
#[derive(Debug, thiserror::Error)]
pub enum AidServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("transaction failed: {0}")]
    TransactionFailure(#[source] RepositoryError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl AidServiceError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
