//! Patient identity removal.
//!
//! Anonymization is a pure transform from a record and its descriptor to a
//! new record; writing the result back is left to the caller.

use reaper_archive::IdentityOverwrite;
use reaper_record::{Field, Record, RecordDescriptor};
use sha2::{Digest, Sha256};
use time::Date;
use tracing::instrument;

/// Ages of this many months or more are written in years.
const MONTHS_LIMIT: i32 = 960;

/// A record with direct identifiers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anonymized {
    pub record: Record,
    /// Pseudonyms for the removed name, for the archive metadata.
    pub identity: IdentityOverwrite,
    /// The age written in place of the birth date, if one could be derived.
    pub age: Option<String>,
}

/// Removes the patient name and birth date.
///
/// Each name component is replaced by its SHA-256 hex digest in the returned
/// identity. When both the birth date and a study (or, failing that,
/// acquisition) date are known, the patient's age at the time of the study is
/// written in their place.
#[instrument(level = "debug", skip_all)]
pub fn anonymize(record: &Record, descriptor: &RecordDescriptor) -> Anonymized {
    let (first, last) = descriptor
        .patient_name
        .as_ref()
        .map(|name| (name.first.as_deref(), name.last.as_deref()))
        .unwrap_or_default();
    let identity = IdentityOverwrite {
        first_name_hash: first.map(hash_component),
        last_name_hash: last.map(hash_component),
    };

    let studied = descriptor.studied.or(descriptor.acquired).map(|ts| ts.date());
    let age = descriptor
        .birth_date
        .zip(studied)
        .map(|(birth, studied)| format_age(age_in_months(birth, studied)));

    let mut anonymized = record.clone();
    anonymized.remove(Field::PatientName);
    anonymized.remove(Field::PatientBirthDate);
    if let Some(age) = &age {
        anonymized.set(Field::PatientAge, age.as_str());
    }
    Anonymized {
        record: anonymized,
        identity,
        age,
    }
}

/// Whole months between `birth` and `at`. A month only counts once its
/// day-of-month has been reached.
pub fn age_in_months(birth: Date, at: Date) -> i32 {
    let years = at.year() - birth.year();
    let months = i32::from(u8::from(at.month())) - i32::from(u8::from(birth.month()));
    12 * years + months - i32::from(at.day() < birth.day())
}

/// Formats an age as `NNNM` below [`MONTHS_LIMIT`] months, `NNNY` otherwise.
/// Negative ages clamp to zero.
pub fn format_age(months: i32) -> String {
    let months = months.max(0);
    if months < MONTHS_LIMIT {
        format!("{months:03}M")
    } else {
        format!("{:03}Y", months / 12)
    }
}

fn hash_component(component: &str) -> String {
    format!("{:x}", Sha256::digest(component.as_bytes()))
}
