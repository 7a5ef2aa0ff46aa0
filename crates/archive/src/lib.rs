//! Sealed acquisition archives.
//!
//! An archive is a ZIP container holding one directory of records, with an
//! [`ArchiveMetadata`] JSON document stored in the archive comment. Sealing is
//! deterministic: entry order, compression and entry timestamps depend only
//! on the inputs.

pub mod error;
mod metadata;
mod read;
mod write;

pub use crate::metadata::{ArchiveMetadata, IdentityOverwrite};
pub use crate::read::ArchiveReader;
pub use crate::write::{Entry, Sealed, seal};

/// File extension of sealed archives.
pub const EXTENSION: &str = "zip";
