use super::authorization::Action;
use super::domain::{SchoolId, UnknownDocumentType, UserId};
use super::files::FileStoreError;
use super::store::StoreError;

/// Typed failures of every workflow operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("user {actor} is not allowed to {action}")]
    Forbidden { actor: UserId, action: Action },
    #[error("cannot {action} a {entity} that is {from}")]
    InvalidStateTransition {
        entity: &'static str,
        from: &'static str,
        action: &'static str,
    },
    #[error("student {student_id} already has an active enrollment with school {school_id}")]
    DuplicateEnrollment {
        student_id: UserId,
        school_id: SchoolId,
    },
    #[error("{entity} {id} was modified concurrently; re-read and retry")]
    Conflict { entity: &'static str, id: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("entity store failure: {0}")]
    Store(StoreError),
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
}

impl WorkflowError {
    /// Only optimistic-version conflicts are worth an automatic re-read and resubmit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::Conflict { .. })
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn stale(entity: &'static str, id: impl ToString) -> Self {
        WorkflowError::Conflict {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict { entity, id } => WorkflowError::Conflict { entity, id },
            other => WorkflowError::Store(other),
        }
    }
}

impl From<UnknownDocumentType> for WorkflowError {
    fn from(value: UnknownDocumentType) -> Self {
        WorkflowError::Validation(value.to_string())
    }
}

/// Re-run `operation` while it fails with a conflict, up to `attempts` times in total.
///
/// The closure must re-read whatever version it submits so each attempt starts fresh.
pub fn retry_on_conflict<T, F>(attempts: usize, mut operation: F) -> Result<T, WorkflowError>
where
    F: FnMut() -> Result<T, WorkflowError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation() {
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::debug!(attempt, error = %err, "retrying after version conflict");
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}
