//! JSON record codec for testing.

use crate::error::{ErrorKind, Result};
use crate::{Record, RecordCodec};
use exn::ResultExt;

/// Stores records as JSON documents.
///
/// Stands in for a real record-format library in tests of crates that only
/// need [`RecordCodec`] behaviour. It reports the `dicom`/`dcm` tag and
/// extension by default so archive names look like production ones.
///
/// # Examples
///
/// ```
/// use reaper_record::{Field, JsonCodec, Record, RecordCodec};
///
/// let codec = JsonCodec::default();
/// let bytes = codec.encode(&Record::new().with(Field::PatientId, "ex1")).unwrap();
/// let record = codec.decode(&bytes, false).unwrap();
/// assert_eq!(record.get(Field::PatientId), Some("ex1"));
/// ```
#[derive(Debug, Clone)]
pub struct JsonCodec {
    tag: String,
    extension: String,
}

impl JsonCodec {
    /// Change the reported format tag and extension.
    pub fn with_format(mut self, tag: impl Into<String>, extension: impl Into<String>) -> Self {
        self.tag = tag.into();
        self.extension = extension.into();
        self
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self {
            tag: "dicom".to_string(),
            extension: "dcm".to_string(),
        }
    }
}

impl RecordCodec for JsonCodec {
    fn format_tag(&self) -> &str {
        &self.tag
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn decode(&self, bytes: &[u8], read_pixels: bool) -> Result<Record> {
        let record: Record = serde_json::from_slice(bytes).or_raise(|| ErrorKind::InvalidRecord)?;
        Ok(if read_pixels { record } else { record.without_pixels() })
    }

    fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        serde_json::to_vec(record).or_raise(|| ErrorKind::InvalidRecord)
    }
}
