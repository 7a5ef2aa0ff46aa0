use crate::ArchiveMetadata;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Read access to a sealed archive.
pub struct ArchiveReader {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
        let zip = ZipArchive::new(BufReader::new(file)).or_raise(|| ErrorKind::InvalidArchive)?;
        Ok(Self {
            path: path.to_path_buf(),
            zip,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries, including directory entries.
    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.is_empty()
    }

    /// Parses the metadata embedded in the archive comment.
    pub fn metadata(&self) -> Result<ArchiveMetadata> {
        let comment = self.zip.comment();
        if comment.is_empty() {
            exn::bail!(ErrorKind::InvalidMetadata);
        }
        serde_json::from_slice(comment).or_raise(|| ErrorKind::InvalidMetadata)
    }

    /// Entry names in archive order.
    pub fn entry_names(&mut self) -> Result<Vec<String>> {
        (0..self.zip.len())
            .map(|index| {
                let entry = self.zip.by_index(index).or_raise(|| ErrorKind::InvalidArchive)?;
                Ok(entry.name().to_string())
            })
            .collect()
    }

    /// Contents of the first file entry, or `None` if the archive holds only
    /// directories.
    pub fn first_file(&mut self) -> Result<Option<Vec<u8>>> {
        for index in 0..self.zip.len() {
            let mut entry = self.zip.by_index(index).or_raise(|| ErrorKind::InvalidArchive)?;
            if entry.is_dir() {
                continue;
            }
            let mut contents = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
            entry.read_to_end(&mut contents).or_raise(|| ErrorKind::InvalidArchive)?;
            return Ok(Some(contents));
        }
        Ok(None)
    }
}
