//! Error types for the store layer.

/// Errors surfaced by key/value and persistence backends.
///
/// Infrastructure failures must never corrupt room state: callers abort
/// the operation cleanly and may retry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend is unreachable or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted (wrong type for the key,
    /// corrupt entry).
    #[error("malformed value at key {key}: {reason}")]
    Malformed { key: String, reason: String },
}
