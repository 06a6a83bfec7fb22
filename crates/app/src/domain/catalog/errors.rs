//! Catalog errors.

use thiserror::Error;

/// Failures of catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog backend could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// The lookup did not answer in time.
    #[error("catalog lookup timed out")]
    Timeout,
}

impl CatalogError {
    /// Whether retrying the lookup may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}
