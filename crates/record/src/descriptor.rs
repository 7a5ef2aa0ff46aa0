use crate::datetime::{parse_date, timestamp};
use crate::error::Result;
use crate::{Field, PatientName, Record};
use time::{Date, PrimitiveDateTime};
use tracing::instrument;

/// Read-only view of the fields the reaper needs from a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    /// Literal acquisition number text, if the record has one.
    pub acquisition_number: Option<String>,
    /// Patient identifier; empty when the record doesn't carry one.
    pub patient_id: String,
    pub acquired: Option<PrimitiveDateTime>,
    pub studied: Option<PrimitiveDateTime>,
    pub manufacturer: Option<String>,
    pub patient_name: Option<PatientName>,
    pub birth_date: Option<Date>,
}

impl RecordDescriptor {
    /// Derives the descriptor from a record's fields.
    ///
    /// # Errors
    /// Returns [`ParseError`](crate::error::ErrorKind::ParseError) when a date
    /// or time field is present but malformed.
    #[instrument(level = "trace", skip_all)]
    pub fn read(record: &Record) -> Result<Self> {
        let acquired = timestamp(
            (Field::AcquisitionDate.as_str(), record.get(Field::AcquisitionDate)),
            (Field::AcquisitionTime.as_str(), record.get(Field::AcquisitionTime)),
        )?;
        let studied = timestamp(
            (Field::StudyDate.as_str(), record.get(Field::StudyDate)),
            (Field::StudyTime.as_str(), record.get(Field::StudyTime)),
        )?;
        let birth_date = record
            .get(Field::PatientBirthDate)
            .map(|v| parse_date(Field::PatientBirthDate.as_str(), v))
            .transpose()?;
        Ok(Self {
            acquisition_number: record.get(Field::AcquisitionNumber).map(str::to_string),
            patient_id: record.get(Field::PatientId).unwrap_or_default().to_string(),
            acquired,
            studied,
            manufacturer: record.get(Field::Manufacturer).map(str::to_string),
            patient_name: record.get(Field::PatientName).and_then(PatientName::parse),
            birth_date,
        })
    }

    /// When the record was made: the acquisition timestamp, falling back to
    /// the study timestamp.
    pub fn timestamp(&self) -> Option<PrimitiveDateTime> {
        self.acquired.or(self.studied)
    }
}
