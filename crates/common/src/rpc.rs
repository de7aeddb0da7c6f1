//! Failure classification for synchronous calls between services.

use thiserror::Error;

/// Outcome of a failed request to another service.
///
/// Callers translate these into their own errors: a missing entity is
/// usually surfaced to the client, anything else aborts the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The remote service answered that the entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote service could not be reached, timed out or failed.
    #[error("unavailable: {0}")]
    Unavailable(String),
}
