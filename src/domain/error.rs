use thiserror::Error;
use uuid::Uuid;

/// Failure reported by the remote service, normalized by the gateway layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("no row with id {0}")]
    NotFound(Uuid),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("malformed response: {0}")]
    Protocol(String),
}

/// Failure surfaced by a synchronizer mutation, after local recovery
/// (rollback or re-fetch) has already run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("no active user session")]
    NotAuthenticated,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// Deleting a list's dependent todos failed; the list delete was never
    /// attempted and the list stays in place.
    #[error("cascade delete for list {list_id} failed: {source}")]
    CascadeDelete { list_id: Uuid, source: RemoteError },
}
