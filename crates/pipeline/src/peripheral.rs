//! Peripheral data extraction.
//!
//! Some acquisitions come with data recorded outside the image archive (for
//! example physiological logs) that has to be matched to the acquisition and
//! packaged alongside it. The matching itself belongs to the extractors; the
//! reaper only hands each of them a view of every freshly packaged
//! acquisition.

use crate::Acquisition;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use reaper_archive::{ArchiveMetadata, ArchiveReader};
use reaper_record::{RecordCodec, RecordDescriptor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// What an extractor knows about a packaged acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedRecord {
    /// The sealed archive.
    pub path: PathBuf,
    pub metadata: ArchiveMetadata,
    /// Descriptor of the first record in the archive, after anonymization.
    pub descriptor: RecordDescriptor,
}

impl PackagedRecord {
    /// Reads the metadata and first record back out of a sealed archive.
    pub fn open(archive: &Path, codec: &dyn RecordCodec) -> Result<Self> {
        let mut reader = ArchiveReader::open(archive).or_raise(|| ErrorKind::Archive)?;
        let metadata = reader.metadata().or_raise(|| ErrorKind::Archive)?;
        let Some(bytes) = reader.first_file().or_raise(|| ErrorKind::Archive)? else {
            exn::bail!(ErrorKind::Archive);
        };
        let record = codec.decode(&bytes, false).or_raise(|| ErrorKind::Record)?;
        let descriptor = RecordDescriptor::read(&record).or_raise(|| ErrorKind::Record)?;
        Ok(Self {
            path: archive.to_path_buf(),
            metadata,
            descriptor,
        })
    }
}

/// Everything handed to one extractor for one acquisition.
#[derive(Debug, Clone, Copy)]
pub struct PeripheralRequest<'a> {
    /// Name the extractor was registered under.
    pub name: &'a str,
    /// Scratch directory of the reap; extractors write their output here.
    pub scratch_dir: &'a Path,
    pub record: &'a PackagedRecord,
    pub name_prefix: &'a str,
    pub log_label: &'a str,
    /// Configured data source for this extractor, if any.
    pub source: Option<&'a Path>,
}

impl PeripheralRequest<'_> {
    /// Stem for files the extractor produces: `<name prefix>_<extractor name>`.
    pub fn output_prefix(&self) -> String {
        format!("{}_{}", self.name_prefix, self.name)
    }
}

/// Locates and packages peripheral data for an acquisition.
///
/// Runs on the blocking thread pool.
pub trait PeripheralExtractor: Send + Sync {
    fn extract(&self, request: &PeripheralRequest<'_>) -> Result<()>;
}

impl<F> PeripheralExtractor for F
where
    F: Fn(&PeripheralRequest<'_>) -> Result<()> + Send + Sync,
{
    fn extract(&self, request: &PeripheralRequest<'_>) -> Result<()> {
        self(request)
    }
}

/// Ordered, immutable set of extractors and their data sources.
#[derive(Clone, Default)]
pub struct PeripheralRegistry {
    extractors: Arc<[(String, Arc<dyn PeripheralExtractor>)]>,
    sources: Arc<BTreeMap<String, PathBuf>>,
}

impl PeripheralRegistry {
    /// Fixes the registry. Sources configured for a name no extractor is
    /// registered under are reported and ignored.
    pub fn new(extractors: Vec<(String, Arc<dyn PeripheralExtractor>)>, sources: BTreeMap<String, PathBuf>) -> Self {
        for name in sources.keys() {
            if !extractors.iter().any(|(registered, _)| registered == name) {
                tracing::warn!(peripheral = %name, "No extractor registered for configured peripheral source");
            }
        }
        Self {
            extractors: extractors.into(),
            sources: Arc::new(sources),
        }
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extractors.iter().map(|(name, _)| name.as_str())
    }

    /// Runs every extractor, in registration order, against one acquisition.
    ///
    /// The archive is already sealed, so failures (including failing to read
    /// the archive back) are logged and counted rather than returned.
    #[instrument(skip_all, fields(acquisition = %acquisition.log_label))]
    pub fn run(&self, scratch_dir: &Path, acquisition: &Acquisition, codec: &dyn RecordCodec) -> usize {
        if self.extractors.is_empty() {
            return 0;
        }
        let record = match PackagedRecord::open(&acquisition.path, codec) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = ?e, "Could not read packaged acquisition for peripheral extraction");
                return self.extractors.len();
            },
        };
        let mut failures = 0;
        for (name, extractor) in self.extractors.iter() {
            let request = PeripheralRequest {
                name,
                scratch_dir,
                record: &record,
                name_prefix: &acquisition.name_prefix,
                log_label: &acquisition.log_label,
                source: self.sources.get(name).map(PathBuf::as_path),
            };
            if let Err(e) = extractor.extract(&request) {
                tracing::warn!(peripheral = %name, error = ?e, "Peripheral extraction failure");
                failures += 1;
            }
        }
        failures
    }
}
