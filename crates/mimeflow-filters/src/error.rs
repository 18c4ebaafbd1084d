//! Error types for filter construction.

/// Result type alias for filter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Filter error types.
///
/// Filters never fail mid-stream: malformed input is recovered locally and
/// unexpected transform failures degrade to an identity passthrough. The
/// only hard failure is rejecting an unsupported configuration up front.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested character set is not supported by the transcoder.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),
}
