//! Pipeline Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the record, archive and
//! network crates are raised into these kinds, keeping their frames as
//! children in the error tree.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a pipeline failure.
///
/// ### Operational Errors
/// - [`ErrorKind::Filter`]
/// - [`ErrorKind::Inventory`]
/// - [`ErrorKind::Peripheral`]
/// - [`ErrorKind::NameCollision`]
/// - [`ErrorKind::Interrupted`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Network`]
/// - [`ErrorKind::Record`]
/// - [`ErrorKind::Anonymize`]
/// - [`ErrorKind::Archive`]
/// - [`ErrorKind::Io`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The allow pattern could not be compiled.
    #[display("invalid identity filter")]
    Filter,
    /// A find or move against the remote archive failed.
    #[display("remote archive operation failed")]
    Network,
    /// The inventory response held a record that could not be understood.
    #[display("malformed inventory")]
    Inventory,
    /// A retrieved record could not be read.
    #[display("unreadable record")]
    Record,
    /// An anonymized record could not be written back.
    #[display("anonymization failed")]
    Anonymize,
    /// An acquisition archive could not be sealed or read back.
    #[display("archive failure")]
    Archive,
    /// A file or directory operation failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// A peripheral extractor failed.
    #[display("peripheral extraction failed: {_0}")]
    Peripheral(#[error(not(source))] String),
    /// Normalizing a retrieved file name would overwrite another retrieved
    /// file.
    #[display("file name collision: {}", _0.display())]
    NameCollision(#[error(not(source))] PathBuf),
    /// Blocking work was cancelled or panicked before finishing.
    #[display("interrupted")]
    Interrupted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Inventory errors count as retryable: the next poll issues a fresh
    /// query. So do unreadable records, which a fresh retrieval replaces.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Inventory | Self::Record | Self::Io(_) | Self::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Network, true)]
    #[case(ErrorKind::Inventory, true)]
    #[case(ErrorKind::Io(PathBuf::from("/tmp")), true)]
    #[case(ErrorKind::Record, true)]
    #[case(ErrorKind::NameCollision(PathBuf::from("/tmp/NA1")), false)]
    #[case(ErrorKind::Filter, false)]
    #[case(ErrorKind::Peripheral("physio".to_string()), false)]
    fn retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn raised_from_dependency() {
        let inner: reaper_net::error::Result<()> =
            Err(exn::Exn::from(reaper_net::error::ErrorKind::Communication("timeout".to_string())));
        let err: Result<()> = inner.or_raise(|| ErrorKind::Network);
        let err = err.unwrap_err();
        assert!(matches!(*err, ErrorKind::Network));
        assert!(err.is_retryable());
    }
}
