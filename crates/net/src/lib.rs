//! Contract with the query/retrieve protocol engine.
//!
//! The wire protocol lives outside the reaper. This crate describes the two
//! operations the reaper needs from it, series-level [`find`] and
//! [`move_series`], the [`SeriesQuery`] templates it issues, and the
//! [`Endpoint`] parameters a concrete engine connects with.
//!
//! An in-memory [`MockArchive`] is available behind the `mock` feature.
//!
//! [`find`]: RemoteArchive::find
//! [`move_series`]: RemoteArchive::move_series

mod endpoint;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
mod query;
mod remote;

pub use crate::endpoint::{Endpoint, MAX_TITLE_LEN};
#[cfg(feature = "mock")]
pub use crate::mock::MockArchive;
pub use crate::query::SeriesQuery;
pub use crate::remote::{MoveOutcome, RemoteArchive};
use std::sync::Arc;

pub type RemoteHandle = Arc<dyn RemoteArchive + Send + Sync>;
