//! Error types for the matchmaking layer.

use shoalfire_store::StoreError;

/// Errors that can occur while operating the matchmaking queue.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The queue's backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A queue entry failed to serialize.
    #[error("queue entry encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}
