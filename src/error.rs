//! Error type surfaced by every public mutation and query.
//!
//! Callers get one human-readable message through `Display`; no structured
//! error codes cross this boundary.

use crate::store::StoreError;

/// Error returned by the ticket, ledger and rebuild operations
#[derive(Debug)]
pub enum SalonError {
    /// Input rejected before any write was attempted
    Validation(String),
    /// A document the operation depends on does not exist
    NotFound(String),
    /// The document store failed; the batch was not applied
    Store(StoreError),
}

impl SalonError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        SalonError::Validation(message.into())
    }

    /// True when the failure happened before anything reached the store
    pub fn is_validation(&self) -> bool {
        matches!(self, SalonError::Validation(_))
    }
}

impl std::fmt::Display for SalonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SalonError::Validation(msg) => write!(f, "{msg}"),
            SalonError::NotFound(what) => write!(f, "Not found: {what}"),
            SalonError::Store(e) => write!(f, "Store error: {e}"),
        }
    }
}

impl std::error::Error for SalonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SalonError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SalonError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => SalonError::NotFound(path),
            other => SalonError::Store(other),
        }
    }
}
