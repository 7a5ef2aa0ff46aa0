//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An entry source or the archive itself could not be read or written.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The archive container is corrupt or not a ZIP archive. Used for reading.
    #[display("invalid or corrupted archive")]
    InvalidArchive,
    /// The embedded metadata is missing or is not the expected JSON document.
    #[display("invalid archive metadata")]
    InvalidMetadata,
    /// Failed while encoding an entry into the archive.
    Encoder,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io(_))
    }
}
