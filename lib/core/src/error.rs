use crate::listing::ListingId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Listing not found: {0}")]
    NotFound(ListingId),

    #[error("Invalid attribute on listing {id}: {reason}")]
    InvalidAttribute { id: ListingId, reason: String },

    #[error("Listing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Vector provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Precompute pass interrupted after {committed} listings were written: {source}")]
    PassInterrupted {
        committed: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn invalid(id: ListingId, reason: impl Into<String>) -> Self {
        Error::InvalidAttribute {
            id,
            reason: reason.into(),
        }
    }

    /// Collaborator failures that a caller may retry; the engine itself never retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::ProviderUnavailable(_) | Error::PassInterrupted { .. }
        )
    }
}
