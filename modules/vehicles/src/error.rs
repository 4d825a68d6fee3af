//! Error taxonomy for dispatched operations
//!
//! Handler failures are normalized into the uniform response envelope with
//! one exception: a storage-layer timeout is re-raised past normalization so
//! upstream retry logic can tell transient infrastructure failure apart from
//! a domain rejection.

use crate::store::StoreError;
use event_bus::BusError;
use event_store::EventStoreError;

/// Errors produced by command/query handlers
#[derive(Debug, thiserror::Error)]
pub enum CrudError {
    #[error("operation {operation} requires one of roles {required:?}")]
    PermissionDenied {
        operation: String,
        required: &'static [&'static str],
    },

    /// Domain rejection (e.g. generation already running); surfaced, not retried
    #[error("{0}")]
    Domain(String),

    /// Distinguished transient infrastructure failure; re-raised, never normalized
    #[error("storage timeout: {0}")]
    StorageTimeout(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Catch-all; surfaced without internal detail
    #[error("internal error: {0}")]
    Internal(String),
}

impl CrudError {
    /// Response code carried in the uniform error envelope
    pub fn code(&self) -> u16 {
        match self {
            CrudError::PermissionDenied { .. } => 403,
            CrudError::Domain(_) => 409,
            CrudError::InvalidArgs(_) => 400,
            CrudError::StorageTimeout(_) | CrudError::Internal(_) => 500,
        }
    }

    /// Stable error name carried in the uniform error envelope
    pub fn name(&self) -> &'static str {
        match self {
            CrudError::PermissionDenied { .. } => "PermissionDenied",
            CrudError::Domain(_) => "DomainError",
            CrudError::InvalidArgs(_) => "InvalidArguments",
            CrudError::StorageTimeout(_) => "StorageTimeout",
            CrudError::Internal(_) => "InternalError",
        }
    }

    /// Message exposed to the caller
    ///
    /// Internal errors are logged with full detail at the failure site and
    /// surface here as a generic message only.
    pub fn public_message(&self) -> String {
        match self {
            CrudError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for CrudError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(msg) => CrudError::StorageTimeout(msg),
            other => {
                tracing::error!(error = %other, "storage failure");
                CrudError::Internal(other.to_string())
            }
        }
    }
}

impl From<EventStoreError> for CrudError {
    fn from(err: EventStoreError) -> Self {
        tracing::error!(error = %err, "event log failure");
        CrudError::Internal(err.to_string())
    }
}

impl From<BusError> for CrudError {
    fn from(err: BusError) -> Self {
        tracing::error!(error = %err, "broadcast failure");
        CrudError::Internal(err.to_string())
    }
}
