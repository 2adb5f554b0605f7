//! Error types for the store layer.

use std::path::PathBuf;

use playclock_model::ModelError;

/// Errors that can occur while loading or saving player state.
///
/// None of these are fatal to a running service: the in-memory store stays
/// authoritative and the next scheduled save retries. Only a corrupt
/// document at startup stops the service from opening.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading, writing, or renaming the data file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The document could not be encoded or decoded.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The backend refused the operation (e.g. a test store told to fail).
    #[error("persistence backend rejected the operation: {0}")]
    Rejected(String),
}
