use std::path::PathBuf;

use thiserror::Error;

/// Result alias for pack loading operations.
pub type ContentResult<T> = Result<T, ContentError>;

/// Error raised while loading or registering a location pack.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The file or directory could not be read.
    #[error("failed to read {path}")]
    Io {
        /// Offending path.
        path: PathBuf,
        #[source]
        /// Underlying failure.
        source: std::io::Error,
    },
    /// The document is not a valid pack.
    #[error("failed to parse location pack {origin}")]
    Parse {
        /// File path or pack id the document came from.
        origin: String,
        #[source]
        /// Underlying failure.
        source: serde_json::Error,
    },
    /// The pack has nothing to deal.
    #[error("location pack {0} has no usable locations")]
    Empty(String),
}
