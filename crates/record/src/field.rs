use std::fmt::{Display, Formatter, Result as FmtResult};

/// Well-known record attributes, named by their standard keyword.
///
/// Records can carry any number of other fields; these are the ones the
/// reaper reads, queries by, or rewrites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    AcquisitionDate,
    AcquisitionNumber,
    AcquisitionTime,
    Manufacturer,
    NumberOfSeriesRelatedInstances,
    PatientAge,
    PatientBirthDate,
    PatientId,
    PatientName,
    SeriesDate,
    SeriesInstanceUid,
    SeriesNumber,
    SeriesTime,
    StudyDate,
    StudyId,
    StudyInstanceUid,
    StudyTime,
}

impl Field {
    /// The attribute keyword as it appears in records and query templates.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::AcquisitionDate => "AcquisitionDate",
            Field::AcquisitionNumber => "AcquisitionNumber",
            Field::AcquisitionTime => "AcquisitionTime",
            Field::Manufacturer => "Manufacturer",
            Field::NumberOfSeriesRelatedInstances => "NumberOfSeriesRelatedInstances",
            Field::PatientAge => "PatientAge",
            Field::PatientBirthDate => "PatientBirthDate",
            Field::PatientId => "PatientID",
            Field::PatientName => "PatientName",
            Field::SeriesDate => "SeriesDate",
            Field::SeriesInstanceUid => "SeriesInstanceUID",
            Field::SeriesNumber => "SeriesNumber",
            Field::SeriesTime => "SeriesTime",
            Field::StudyDate => "StudyDate",
            Field::StudyId => "StudyID",
            Field::StudyInstanceUid => "StudyInstanceUID",
            Field::StudyTime => "StudyTime",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Field {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}
