//! Unified error type.

use thiserror::Error;

/// The error type returned by bindery's fallible operations.
///
/// Validation failures are never expressed as `Error`s: they are data, carried
/// in [`ValidationErrors`](crate::ValidationErrors). This type surfaces the
/// failures that abort a request before validation runs (oversized or
/// unreadable bodies, broken multipart, undecodable JSON) plus the server's
/// own infrastructure failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    /// The body stream went past the configured byte cap.
    #[error("http: request body too large (limit is {limit} bytes)")]
    BodyTooLarge { limit: usize },

    #[error("reading request body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("multipart: {0}")]
    Multipart(#[from] multer::Error),

    /// Structural JSON failure: empty body, truncated input or invalid syntax.
    /// Type mismatches on individual fields never produce this variant.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
