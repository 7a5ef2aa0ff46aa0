//! Network Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A protocol-engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote archive could not be reached, rejected the association, or
    /// aborted the operation.
    #[display("communication failure: {_0}")]
    Communication(#[error(not(source))] String),
    /// Connection parameters are missing or malformed. Not retryable; the
    /// configuration has to change.
    #[display("invalid endpoint: {_0}")]
    InvalidEndpoint(#[error(not(source))] String),
    /// Retrieved files could not be written to the destination directory.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Communication(_) | Self::Io(_))
    }
}
