//! Imaging record model for the reaper.
//!
//! The record format itself belongs to an external library; this crate
//! describes what the reaper needs from it:
//!
//! - a [`Record`] value with named text [`Field`]s and an optional pixel
//!   payload,
//! - the [`RecordCodec`] contract for opening and saving records,
//! - the derived, read-only [`RecordDescriptor`] used for filtering, grouping
//!   and anonymization (timestamps, acquisition number, patient identity).
//!
//! A JSON-backed [`JsonCodec`] test double is available behind the `mock`
//! feature.

mod codec;
pub mod datetime;
mod descriptor;
pub mod error;
mod field;
#[cfg(feature = "mock")]
mod mock;
mod name;
mod record;

pub use crate::codec::{CodecHandle, RecordCodec};
pub use crate::descriptor::RecordDescriptor;
pub use crate::field::Field;
#[cfg(feature = "mock")]
pub use crate::mock::JsonCodec;
pub use crate::name::PatientName;
pub use crate::record::Record;
