use crate::ArchiveMetadata;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use time::PrimitiveDateTime;
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// A file to be placed in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Where the file currently lives. Its file name becomes the entry name.
    pub source: PathBuf,
    /// Timestamp stamped on the entry. Archives only store local (naive)
    /// times with two-second resolution; dates outside 1980 to 2107 fall back
    /// to the format's epoch.
    pub modified: Option<PrimitiveDateTime>,
}

impl Entry {
    pub fn new(source: impl Into<PathBuf>, modified: Option<PrimitiveDateTime>) -> Self {
        Self { source: source.into(), modified }
    }
}

/// Summary of a freshly sealed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub path: PathBuf,
    /// Number of file entries (excluding the root directory entry).
    pub entries: usize,
    /// Archive size in bytes.
    pub size: u64,
    /// BLAKE3 hash of the archive bytes.
    pub hash: String,
}

/// Writes `entries` into a new archive at `output`, in the order given, under
/// a single `root` directory, with `metadata` embedded as the archive comment.
///
/// Entries are DEFLATE-compressed and stamped with their own timestamps rather
/// than the time of sealing, so identical inputs produce identical bytes.
///
/// Any existing file at `output` is replaced. If sealing fails part-way, the
/// partial archive is removed before the error is returned.
#[instrument(skip_all, fields(archive = %output.display(), entries = entries.len()))]
pub fn seal(output: &Path, root: &str, entries: &[Entry], metadata: &ArchiveMetadata) -> Result<Sealed> {
    match seal_inner(output, root, entries, metadata) {
        Ok(sealed) => {
            tracing::debug!(size = sealed.size, hash = %sealed.hash, "Archive sealed");
            Ok(sealed)
        },
        Err(e) => {
            // Never leave a truncated archive behind.
            _ = fs::remove_file(output);
            Err(e)
        },
    }
}

fn seal_inner(output: &Path, root: &str, entries: &[Entry], metadata: &ArchiveMetadata) -> Result<Sealed> {
    let io_error = || ErrorKind::Io(output.to_path_buf());
    let comment = serde_json::to_string(metadata).or_raise(|| ErrorKind::InvalidMetadata)?;
    let root = root.trim_matches('/');

    let file = File::create(output).or_raise(io_error)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    zip.set_comment(comment);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    zip.add_directory(format!("{root}/"), options).or_raise(|| ErrorKind::Encoder)?;
    for entry in entries {
        let name = entry.source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if name.is_empty() {
            exn::bail!(ErrorKind::Io(entry.source.clone()));
        }
        zip.start_file(format!("{root}/{name}"), options.last_modified_time(dos_time(entry.modified)))
            .or_raise(|| ErrorKind::Encoder)?;
        let mut source = File::open(&entry.source).or_raise(|| ErrorKind::Io(entry.source.clone()))?;
        io::copy(&mut source, &mut zip).or_raise(|| ErrorKind::Io(entry.source.clone()))?;
    }
    let writer = zip.finish().or_raise(|| ErrorKind::Encoder)?;
    // Flush errors are lost on drop.
    writer.into_inner().or_raise(io_error)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(File::open(output).or_raise(io_error)?).or_raise(io_error)?;
    let size = fs::metadata(output).or_raise(io_error)?.len();
    Ok(Sealed {
        path: output.to_path_buf(),
        entries: entries.len(),
        size,
        hash: hasher.finalize().to_string(),
    })
}

fn dos_time(timestamp: Option<PrimitiveDateTime>) -> DateTime {
    timestamp
        .and_then(|ts| {
            DateTime::from_date_and_time(
                u16::try_from(ts.year()).ok()?,
                u8::from(ts.month()),
                ts.day(),
                ts.hour(),
                ts.minute(),
                ts.second(),
            )
            .ok()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArchiveReader, IdentityOverwrite};
    use time::macros::datetime;

    fn metadata() -> ArchiveMetadata {
        ArchiveMetadata {
            format_tag: "dicom".to_string(),
            timezone: "UTC".to_string(),
            identity: IdentityOverwrite::default(),
        }
    }

    fn write_files(dir: &Path, files: &[(&str, &[u8])]) -> Vec<Entry> {
        files
            .iter()
            .map(|(name, data)| {
                let path = dir.join(name);
                fs::write(&path, data).unwrap();
                Entry::new(path, Some(datetime!(2000-01-01 08:30)))
            })
            .collect()
    }

    #[test]
    fn test_seal_preserves_entry_order() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_files(dir.path(), &[("b.dcm", b"second"), ("a.dcm", b"first"), ("c.dcm", b"")]);
        let output = dir.path().join("out.zip");
        let sealed = seal(&output, "1.2.3_dicom", &entries, &metadata()).unwrap();
        assert_eq!(sealed.entries, 3);
        assert_eq!(sealed.size, fs::metadata(&output).unwrap().len());

        let mut reader = ArchiveReader::open(&output).unwrap();
        assert_eq!(
            reader.entry_names().unwrap(),
            vec!["1.2.3_dicom/", "1.2.3_dicom/b.dcm", "1.2.3_dicom/a.dcm", "1.2.3_dicom/c.dcm"]
        );
        assert_eq!(reader.metadata().unwrap(), metadata());
        assert_eq!(reader.first_file().unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn test_seal_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let entries = write_files(dir.path(), &[("1.dcm", b"one"), ("2.dcm", b"two")]);
        let first = seal(&dir.path().join("first.zip"), "x", &entries, &metadata()).unwrap();
        let second = seal(&dir.path().join("second.zip"), "x", &entries, &metadata()).unwrap();
        assert_eq!(first.hash, second.hash);
        assert_eq!(fs::read(&first.path).unwrap(), fs::read(&second.path).unwrap());
    }

    #[test]
    fn test_failed_seal_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.zip");
        let entries = [Entry::new(dir.path().join("missing.dcm"), None)];
        let err = seal(&output, "x", &entries, &metadata()).unwrap_err();
        assert_eq!(*err, ErrorKind::Io(dir.path().join("missing.dcm")));
        assert!(!output.exists());
    }

    #[test]
    fn test_dos_time_out_of_range() {
        assert_eq!(dos_time(Some(datetime!(1970-01-01 00:00))), DateTime::default());
        assert_eq!(dos_time(None), DateTime::default());
        assert_ne!(dos_time(Some(datetime!(2000-01-01 08:30))), DateTime::default());
    }
}
