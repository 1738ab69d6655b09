pub mod checkout;
pub mod health;
pub mod metrics;
pub mod sagas;

use crate::error::ApiError;

/// Parses a path segment into a typed id, answering 400 when it is not a UUID.
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what}: {raw}")))
}
