//! Contract with the record-format library.
//!
//! The reaper treats the on-disk record format as opaque: it only needs to
//! decode a record's fields (optionally skipping the pixel payload), encode a
//! modified record back, and know the format's tag and file extension for
//! naming archives.

use crate::Record;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;

/// Shared, thread-safe codec handle.
pub type CodecHandle = Arc<dyn RecordCodec>;

pub trait RecordCodec: Send + Sync {
    /// Short tag identifying the record format (e.g. `dicom`). Used in
    /// archive names and embedded archive metadata.
    fn format_tag(&self) -> &str;

    /// File extension (without the dot) given to records placed in archives.
    fn extension(&self) -> &str;

    /// Decodes a record. When `read_pixels` is `false` the pixel payload is
    /// skipped, which is considerably cheaper for large images.
    fn decode(&self, bytes: &[u8], read_pixels: bool) -> Result<Record>;

    /// Encodes a record, including whatever pixel payload it carries.
    fn encode(&self, record: &Record) -> Result<Vec<u8>>;

    /// Reads and decodes the record stored at `path`.
    fn open(&self, path: &Path, read_pixels: bool) -> Result<Record> {
        let bytes = std::fs::read(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
        self.decode(&bytes, read_pixels)
    }

    /// Encodes `record` and writes it to `path`, replacing any existing file.
    fn save(&self, record: &Record, path: &Path) -> Result<()> {
        let bytes = self.encode(record)?;
        std::fs::write(path, bytes).or_raise(|| ErrorKind::Io(path.to_path_buf()))
    }
}
