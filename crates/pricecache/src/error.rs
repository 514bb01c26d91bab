use std::time::Duration;

use thiserror::Error;

/// An error reported by the underlying [`PriceService`](crate::PriceService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service does not know a price for the requested item.
    #[error("not found")]
    NotFound,
    /// The service did not answer within the configured `fetch_timeout`.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The service could not be reached or failed to answer.
    ///
    /// The attached string contains the service's response.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// An error returned from looking up a price through the [`TransparentCache`](crate::TransparentCache).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    /// Fetching the price from the underlying service failed.
    #[error("getting price for `{item_code}` from service: {source}")]
    Upstream {
        item_code: String,
        #[source]
        source: ServiceError,
    },
    /// The lookup task for this item did not run to completion.
    ///
    /// This only happens when the task panicked, and is only reported by the positional batch
    /// lookups.
    #[error("price lookup for `{item_code}` did not complete")]
    Internal { item_code: String },
}

impl PriceError {
    /// The item code this error refers to.
    pub fn item_code(&self) -> &str {
        match self {
            Self::Upstream { item_code, .. } | Self::Internal { item_code } => item_code,
        }
    }

    /// The metrics tag for this error.
    pub(crate) fn metrics_tag(&self) -> &'static str {
        match self {
            Self::Upstream { source, .. } => match source {
                ServiceError::NotFound => "notfound",
                ServiceError::Timeout(_) => "timeout",
                ServiceError::Unavailable(_) => "unavailable",
            },
            Self::Internal { .. } => "internal",
        }
    }
}
