//! HTTP route handlers.

pub mod deliveries;
pub mod ops;
pub mod orders;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path segment into an identifier.
pub(crate) fn parse_id<T: FromStr>(kind: &str, raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {kind} id: {raw}")))
}
