//! Error types for the feed engine.

use std::time::Duration;
use thiserror::Error;

/// Main error type for engine operations.
///
/// Cloneable so the same error can be fanned out to every error observer.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum FeedError {
    #[error("Remote rejected mutation: {0}")]
    Rejected(String),

    #[error("Remote operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote store unavailable")]
    RemoteUnavailable,

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Operation requires an administrator")]
    NotAuthorized,

    #[error("No viewer is signed in")]
    NoViewer,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Subscription dropped: {0}")]
    SubscriptionDropped(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

/// Why a single feed document could not be turned into an entity.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value {value:?} for field `{field}`")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid document id {0:?}")]
    InvalidId(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, FeedError>;
