//! Acquisition partitioning and packaging.
//!
//! A retrieved series is split into acquisitions by acquisition number, and
//! each acquisition is sealed into its own archive next to the retrieved
//! files.

use crate::anonymize::anonymize;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use filetime::FileTime;
use reaper_archive::{ArchiveMetadata, Entry, IdentityOverwrite};
use reaper_config::Timezone;
use reaper_record::{CodecHandle, RecordCodec, RecordDescriptor};
use std::fs;
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;
use tracing::instrument;

/// Manufacturer whose acquisition numbers are not trusted for grouping.
pub const UNRELIABLE_VENDOR: &str = "SIEMENS";

/// File-name prefix the protocol engine writes for records missing the
/// attribute it names files by.
const UNNAMED_PREFIX: &str = "(none)";
const UNNAMED_REPLACEMENT: &str = "NA";

/// A sealed acquisition archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub path: PathBuf,
    /// `<series>[_<acquisition number>]`, the stem of the archive name.
    pub name_prefix: String,
    /// `<series>[.<acquisition number>]`, for logs.
    pub log_label: String,
    pub acquisition_number: Option<String>,
    /// Number of records in the archive.
    pub files: usize,
    pub size: u64,
    /// BLAKE3 hash of the archive.
    pub hash: String,
}

/// A record that has been opened, (optionally) anonymized and normalized in
/// place, waiting to be packaged.
#[derive(Debug)]
struct Prepared {
    path: PathBuf,
    timestamp: Option<PrimitiveDateTime>,
    identity: IdentityOverwrite,
}

#[derive(Debug)]
struct Group {
    key: Option<String>,
    records: Vec<Prepared>,
}

/// Splits retrieved series into acquisitions and packages them.
#[derive(Clone)]
pub struct Partitioner {
    codec: CodecHandle,
    anonymize: bool,
    timezone: Timezone,
}

impl Partitioner {
    pub fn new(codec: CodecHandle, anonymize: bool, timezone: Timezone) -> Self {
        Self {
            codec,
            anonymize,
            timezone,
        }
    }

    pub fn codec(&self) -> &CodecHandle {
        &self.codec
    }

    /// Groups `files` by acquisition and seals one archive per group into
    /// `output_dir`.
    ///
    /// Every file is read (and anonymized, when enabled) before anything is
    /// packaged, so one unreadable record fails the whole series. Groups are
    /// packaged in the order their first record was seen, and records keep
    /// their order within a group. The archive metadata comes from the last
    /// record of each group.
    ///
    /// Consumes the files: each is moved into a staging directory which is
    /// removed once its archive is sealed, whether or not sealing succeeded.
    #[instrument(skip_all, fields(series = series_id, files = files.len()))]
    pub fn partition(&self, files: &[PathBuf], series_id: &str, output_dir: &Path) -> Result<Vec<Acquisition>> {
        let mut groups: Vec<Group> = Vec::new();
        for path in files {
            let (key, prepared) = self.prepare(path)?;
            match groups.iter_mut().find(|group| group.key == key) {
                Some(group) => group.records.push(prepared),
                None => groups.push(Group {
                    key,
                    records: vec![prepared],
                }),
            }
        }
        groups.into_iter().map(|group| self.package(group, series_id, output_dir)).collect()
    }

    /// Opens one record, rewrites it if anonymizing, normalizes its file name
    /// and stamps the file with the record's timestamp.
    fn prepare(&self, path: &Path) -> Result<(Option<String>, Prepared)> {
        let record = self.codec.open(path, self.anonymize).or_raise(|| ErrorKind::Record)?;
        let descriptor = RecordDescriptor::read(&record).or_raise(|| ErrorKind::Record)?;
        let identity = if self.anonymize {
            tracing::debug!(path = %path.display(), "anonymizing");
            let anonymized = anonymize(&record, &descriptor);
            self.codec.save(&anonymized.record, path).or_raise(|| ErrorKind::Anonymize)?;
            anonymized.identity
        } else {
            IdentityOverwrite::default()
        };

        let path = normalize_name(path)?;
        let timestamp = descriptor.timestamp();
        if let Some(timestamp) = timestamp {
            let time = FileTime::from_unix_time(self.timezone.unix_timestamp(timestamp), 0);
            filetime::set_file_times(&path, time, time).or_raise(|| ErrorKind::Io(path.clone()))?;
        }
        Ok((
            acquisition_key(&descriptor),
            Prepared {
                path,
                timestamp,
                identity,
            },
        ))
    }

    #[instrument(skip_all, fields(acquisition = tracing::field::Empty))]
    fn package(&self, group: Group, series_id: &str, output_dir: &Path) -> Result<Acquisition> {
        let (name_prefix, log_label) = match &group.key {
            Some(number) => (format!("{series_id}_{number}"), format!("{series_id}.{number}")),
            None => (series_id.to_string(), series_id.to_string()),
        };
        tracing::Span::current().record("acquisition", log_label.as_str());
        let stage_name = format!("{name_prefix}_{}", self.codec.format_tag());
        let staging = StagingDir::create(output_dir.join(&stage_name))?;

        let mut entries = Vec::with_capacity(group.records.len());
        for record in &group.records {
            let name = record.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let target = staging.path().join(format!("{name}.{}", self.codec.extension()));
            fs::rename(&record.path, &target).or_raise(|| ErrorKind::Io(record.path.clone()))?;
            entries.push(Entry::new(target, record.timestamp));
        }

        let identity = group.records.last().map(|r| r.identity.clone()).unwrap_or_default();
        let metadata = ArchiveMetadata {
            format_tag: self.codec.format_tag().to_string(),
            timezone: self.timezone.name().to_string(),
            identity,
        };
        let output = output_dir.join(format!("{stage_name}.{}", reaper_archive::EXTENSION));
        tracing::info!(files = entries.len(), archive = %output.display(), "compressing");
        let sealed = reaper_archive::seal(&output, &stage_name, &entries, &metadata).or_raise(|| ErrorKind::Archive)?;
        Ok(Acquisition {
            path: sealed.path,
            name_prefix,
            log_label,
            acquisition_number: group.key,
            files: sealed.entries,
            size: sealed.size,
            hash: sealed.hash,
        })
    }
}

/// The grouping key: the literal acquisition number, or `None` when there is
/// none or the manufacturer's numbering can't be trusted.
fn acquisition_key(descriptor: &RecordDescriptor) -> Option<String> {
    if descriptor.manufacturer.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(UNRELIABLE_VENDOR)) {
        return None;
    }
    descriptor.acquisition_number.clone()
}

/// Renames `(none)…` files to `NA…`, returning the (possibly new) path.
/// Refuses to replace a retrieved file that already has the new name.
fn normalize_name(path: &Path) -> Result<PathBuf> {
    let Some(rest) = path.file_name().and_then(|n| n.to_str()).and_then(|n| n.strip_prefix(UNNAMED_PREFIX)) else {
        return Ok(path.to_path_buf());
    };
    let renamed = path.with_file_name(format!("{UNNAMED_REPLACEMENT}{rest}"));
    if renamed.exists() {
        exn::bail!(ErrorKind::NameCollision(renamed));
    }
    fs::rename(path, &renamed).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    Ok(renamed)
}

/// Directory holding one acquisition's files while it is sealed. Removed
/// with everything in it when dropped.
struct StagingDir(PathBuf);

impl StagingDir {
    fn create(path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&path).or_raise(|| ErrorKind::Io(path.clone()))?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.0) {
            tracing::warn!(path = %self.0.display(), error = %e, "Could not remove staging directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reaper_archive::ArchiveReader;
    use reaper_record::{Field, JsonCodec, Record, RecordCodec};
    use std::sync::Arc;

    fn partitioner(anonymize: bool, timezone: &str) -> Partitioner {
        Partitioner::new(Arc::new(JsonCodec::default()), anonymize, timezone.parse().unwrap())
    }

    fn record(acquisition: Option<&str>) -> Record {
        let record = Record::new()
            .with(Field::PatientId, "ex1")
            .with(Field::PatientName, "Doe^Jane")
            .with(Field::PatientBirthDate, "19800101")
            .with(Field::StudyDate, "20000101")
            .with(Field::StudyTime, "083000")
            .with(Field::Manufacturer, "GE MEDICAL SYSTEMS")
            .with_pixels(vec![1, 2, 3]);
        match acquisition {
            Some(number) => record.with(Field::AcquisitionNumber, number),
            None => record,
        }
    }

    fn write_records(dir: &Path, records: &[(&str, Record)]) -> Vec<PathBuf> {
        let codec = JsonCodec::default();
        records
            .iter()
            .map(|(name, record)| {
                let path = dir.join(name);
                codec.save(record, &path).unwrap();
                path
            })
            .collect()
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> =
            fs::read_dir(dir).unwrap().map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_groups_by_acquisition_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_records(
            dir.path(),
            &[("a", record(Some("3"))), ("b", record(Some("2"))), ("c", record(Some("3"))), ("d", record(None))],
        );
        let acquisitions = partitioner(false, "UTC").partition(&files, "1.2.3", dir.path()).unwrap();
        let summary: Vec<(&str, &str, usize)> =
            acquisitions.iter().map(|a| (a.name_prefix.as_str(), a.log_label.as_str(), a.files)).collect();
        assert_eq!(summary, vec![("1.2.3_3", "1.2.3.3", 2), ("1.2.3_2", "1.2.3.2", 1), ("1.2.3", "1.2.3", 1)]);
        assert_eq!(acquisitions[0].path, dir.path().join("1.2.3_3_dicom.zip"));
        assert_eq!(acquisitions[2].acquisition_number, None);
        // Only archives remain; sources and staging directories are gone.
        assert_eq!(file_names(dir.path()), vec!["1.2.3_2_dicom.zip", "1.2.3_3_dicom.zip", "1.2.3_dicom.zip"]);

        let mut reader = ArchiveReader::open(&acquisitions[0].path).unwrap();
        assert_eq!(reader.entry_names().unwrap(), vec!["1.2.3_3_dicom/", "1.2.3_3_dicom/a.dcm", "1.2.3_3_dicom/c.dcm"]);
    }

    #[test]
    fn test_unreliable_vendor_is_never_split() {
        let dir = tempfile::tempdir().unwrap();
        let siemens = |n: &str| record(Some(n)).with(Field::Manufacturer, "Siemens");
        let files = write_records(dir.path(), &[("a", siemens("1")), ("b", siemens("2")), ("c", siemens("3"))]);
        let acquisitions = partitioner(false, "UTC").partition(&files, "1.2.3", dir.path()).unwrap();
        assert_eq!(acquisitions.len(), 1);
        assert_eq!(acquisitions[0].name_prefix, "1.2.3");
        assert_eq!(acquisitions[0].files, 3);
    }

    #[test]
    fn test_unnamed_files_are_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_records(dir.path(), &[("(none).1", record(Some("1")))]);
        let acquisitions = partitioner(false, "UTC").partition(&files, "9", dir.path()).unwrap();
        let mut reader = ArchiveReader::open(&acquisitions[0].path).unwrap();
        assert_eq!(reader.entry_names().unwrap(), vec!["9_1_dicom/", "9_1_dicom/NA.1.dcm"]);
    }

    #[test]
    fn test_unnamed_file_never_replaces_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_records(dir.path(), &[("(none)1", record(Some("1"))), ("NA1", record(Some("1")))]);
        let err = partitioner(false, "UTC").partition(&files, "9", dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NameCollision(path) if *path == dir.path().join("NA1")));
        assert!(dir.path().join("(none)1").exists());
        assert!(dir.path().join("NA1").exists());
        assert!(!dir.path().join("9_1_dicom.zip").exists());
    }

    #[test]
    fn test_anonymized_records_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_records(
            dir.path(),
            &[("a", record(Some("1"))), ("b", record(Some("1")).with(Field::PatientName, "Roe^Richard"))],
        );
        let acquisitions = partitioner(true, "Europe/London").partition(&files, "1.2.3", dir.path()).unwrap();
        let mut reader = ArchiveReader::open(&acquisitions[0].path).unwrap();
        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.format_tag, "dicom");
        assert_eq!(metadata.timezone, "Europe/London");
        // Identity comes from the last record of the group.
        let expected = crate::anonymize::anonymize(
            &record(None).with(Field::PatientName, "Roe^Richard"),
            &RecordDescriptor::read(&record(None).with(Field::PatientName, "Roe^Richard")).unwrap(),
        );
        assert_eq!(metadata.identity, expected.identity);

        let first = JsonCodec::default().decode(&reader.first_file().unwrap().unwrap(), true).unwrap();
        assert!(!first.contains(Field::PatientName));
        assert!(!first.contains(Field::PatientBirthDate));
        assert_eq!(first.get(Field::PatientAge), Some("240M"));
        assert_eq!(first.pixels(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_file_times_follow_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_records(dir.path(), &[("a", record(Some("1")))]);
        let partitioner = partitioner(false, "America/New_York");
        let (_, prepared) = partitioner.prepare(&files[0]).unwrap();
        let modified = FileTime::from_last_modification_time(&fs::metadata(&prepared.path).unwrap());
        // 2000-01-01 08:30 EST
        assert_eq!(modified.unix_seconds(), 946_733_400);
    }

    #[test]
    fn test_unreadable_record_fails_before_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = write_records(dir.path(), &[("a", record(Some("1")))]);
        let garbage = dir.path().join("b");
        fs::write(&garbage, b"not a record").unwrap();
        files.push(garbage);
        let err = partitioner(false, "UTC").partition(&files, "1", dir.path()).unwrap_err();
        assert!(matches!(*err, ErrorKind::Record));
        assert!(!dir.path().join("1_1_dicom.zip").exists());
    }
}
