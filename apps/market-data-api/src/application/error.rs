//! Operation error taxonomy.
//!
//! Every query, export and subscription operation converts its failures to
//! `ServiceError` before returning. The HTTP adapter maps
//! `InvalidArgument` to 400 and `StoreFailure` to 500.

use super::ports::StoreError;
use crate::domain::records::InvalidDataKind;

/// Message for non-integer or out-of-range `depth` / `merge_depth`.
pub const INVALID_DEPTH: &str = "Invalid depth or merge_depth";

/// Errors surfaced by application services.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// The request is malformed. The message is returned to the client.
    #[error("{0}")]
    InvalidArgument(String),

    /// The store, the CSV writer or the temporary file failed.
    #[error("{0}")]
    StoreFailure(String),
}

impl ServiceError {
    /// Shorthand for `InvalidArgument`.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Whether the client is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

impl From<InvalidDataKind> for ServiceError {
    fn from(err: InvalidDataKind) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        Self::StoreFailure(err.to_string())
    }
}
