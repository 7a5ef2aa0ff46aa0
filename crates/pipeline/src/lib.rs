//! The reap-and-repackage pipeline.
//!
//! A scheduler polls [`ReapTarget::query_inventory`] and hands series it has
//! not seen complete to [`ReapTarget::reap`]. For each series the [`Reaper`]
//! checks the patient against the [`IdentityFilter`], retrieves the series,
//! verifies it arrived complete, then lets the [`Partitioner`] split it into
//! acquisitions, anonymize the records and seal one archive per acquisition.
//! Registered peripheral extractors run last, once per sealed archive.

pub mod anonymize;
pub mod error;
mod filter;
pub mod inventory;
mod partition;
pub mod peripheral;
mod reaper;
mod target;

pub use crate::filter::{IdentityFilter, Verdict};
pub use crate::inventory::{Inventory, ItemState, WorkItem};
pub use crate::partition::{Acquisition, Partitioner, UNRELIABLE_VENDOR};
pub use crate::peripheral::{PackagedRecord, PeripheralExtractor, PeripheralRequest};
pub use crate::reaper::{Failure, Outcome, Reaper, ReaperBuilder, SkipReason};
pub use crate::target::ReapTarget;
