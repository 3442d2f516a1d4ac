use thiserror::Error;

use crate::queue::TransientError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Fetch cancelled")]
    Cancelled,
}

impl RegistryError {
    /// HTTP status carried by the failure, when the registry answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Network(e) => e.status().map(|s| s.as_u16()),
            RegistryError::RateLimited { .. } => Some(429),
            RegistryError::NotFound(_) => Some(404),
            RegistryError::UnexpectedStatus { status, .. } => Some(*status),
            RegistryError::InvalidResponse(_) | RegistryError::Cancelled => None,
        }
    }
}

impl TransientError for RegistryError {
    fn is_transient(&self) -> bool {
        match self {
            RegistryError::RateLimited { .. } => true,
            RegistryError::Network(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            RegistryError::NotFound(_)
            | RegistryError::UnexpectedStatus { .. }
            | RegistryError::InvalidResponse(_)
            | RegistryError::Cancelled => false,
        }
    }
}
