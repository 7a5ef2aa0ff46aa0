//! The reap orchestrator.
//!
//! [`Reaper::reap`] takes one series from "the inventory says it exists" to
//! "its acquisitions are sealed": skip checks, retrieval, the authoritative
//! identity check, completeness verification, partitioning and peripheral
//! extraction. Nothing is retried here; a failed attempt is safe to repeat
//! with a fresh scratch directory.

use crate::error::{Error, ErrorKind, Result};
use crate::filter::{IdentityFilter, Verdict};
use crate::inventory::WorkItem;
use crate::partition::{Acquisition, Partitioner};
use crate::peripheral::{PeripheralExtractor, PeripheralRegistry};
use derive_more::Display;
use exn::ResultExt;
use reaper_config::{Config, Timezone};
use reaper_net::{RemoteHandle, SeriesQuery};
use reaper_record::{CodecHandle, RecordCodec, RecordDescriptor};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::instrument;

/// Why a series was not reaped. Skips are final for the poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    /// The inventory declared no images.
    #[display("no images")]
    Empty,
    /// The patient id does not match the allow pattern.
    #[display("patient id not matching allow pattern")]
    NonMatching,
    /// The patient id is on the deny list.
    #[display("patient id on deny list")]
    Denied,
}

impl SkipReason {
    /// The skip a filter verdict calls for, if any.
    pub fn from_verdict(verdict: Verdict) -> Option<Self> {
        match verdict {
            Verdict::Allowed => None,
            Verdict::NonMatching => Some(Self::NonMatching),
            Verdict::Denied => Some(Self::Denied),
        }
    }
}

#[derive(Debug)]
pub enum Failure {
    /// Retrieval did not deliver the declared number of images, or the
    /// remote reported it as unsuccessful. Nothing was packaged.
    Incomplete { expected: u32, written: u32, reported_success: bool },
    /// Another attempt for the same series is still running.
    InProgress,
    /// An error interrupted the attempt.
    Error(Error),
}

impl Failure {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Incomplete { .. } | Self::InProgress => true,
            Self::Error(e) => e.is_retryable(),
        }
    }
}

/// Result of one reap attempt.
#[derive(Debug)]
pub enum Outcome {
    /// Every acquisition was sealed.
    Success(Vec<Acquisition>),
    Skipped(SkipReason),
    Failed(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the scheduler should try this series again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Success(_) | Self::Skipped(_) => false,
            Self::Failed(failure) => failure.is_retryable(),
        }
    }
}

impl From<Error> for Outcome {
    fn from(err: Error) -> Self {
        Self::Failed(Failure::Error(err))
    }
}

/// Configures a [`Reaper`].
///
/// The peripheral registry is fixed by [`build`](Self::build); extractors
/// cannot be added to a running reaper.
pub struct ReaperBuilder {
    remote: RemoteHandle,
    codec: CodecHandle,
    allow_pattern: String,
    deny_list: Vec<String>,
    anonymize: bool,
    timezone: Timezone,
    peripheral_extraction: bool,
    extractors: Vec<(String, Arc<dyn PeripheralExtractor>)>,
    sources: BTreeMap<String, PathBuf>,
    scratch_root: Option<PathBuf>,
    output_dir: PathBuf,
}

impl ReaperBuilder {
    /// A builder with the default policies: everyone allowed, nobody denied,
    /// anonymization on, UTC, no peripheral extraction.
    pub fn new(remote: RemoteHandle, codec: CodecHandle, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            codec,
            allow_pattern: "*".to_string(),
            deny_list: Vec::new(),
            anonymize: true,
            timezone: Timezone::default(),
            peripheral_extraction: false,
            extractors: Vec::new(),
            sources: BTreeMap::new(),
            scratch_root: None,
            output_dir: output_dir.into(),
        }
    }

    /// A builder taking every policy from `config`.
    pub fn from_config(config: &Config, remote: RemoteHandle, codec: CodecHandle) -> Self {
        let mut builder = Self::new(remote, codec, config.output_dir.clone())
            .allow_pattern(config.allow_pattern.clone())
            .deny_list(config.deny_list.clone())
            .anonymize(config.anonymize)
            .timezone(config.timezone)
            .peripheral_extraction(config.peripheral_extraction);
        builder.sources = config.peripheral.clone();
        builder.scratch_root = config.scratch_root.clone();
        builder
    }

    pub fn allow_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allow_pattern = pattern.into();
        self
    }

    pub fn deny_list(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.deny_list = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn anonymize(mut self, anonymize: bool) -> Self {
        self.anonymize = anonymize;
        self
    }

    pub fn timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn peripheral_extraction(mut self, enabled: bool) -> Self {
        self.peripheral_extraction = enabled;
        self
    }

    /// Registers an extractor. Extractors run in registration order.
    pub fn peripheral(mut self, name: impl Into<String>, extractor: impl PeripheralExtractor + 'static) -> Self {
        let extractor: Arc<dyn PeripheralExtractor> = Arc::new(extractor);
        self.extractors.push((name.into(), extractor));
        self
    }

    /// Sets the data source handed to the extractor registered as `name`.
    pub fn peripheral_source(mut self, name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }

    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// # Errors
    /// [`ErrorKind::Filter`] if the allow pattern cannot be compiled.
    pub fn build(self) -> Result<Reaper> {
        let filter = IdentityFilter::new(&self.allow_pattern, &self.deny_list)?;
        let peripherals = self.peripheral_extraction.then(|| PeripheralRegistry::new(self.extractors, self.sources));
        Ok(Reaper {
            remote: self.remote,
            filter,
            partitioner: Partitioner::new(self.codec, self.anonymize, self.timezone),
            peripherals,
            scratch_root: self.scratch_root,
            output_dir: self.output_dir,
            in_flight: Mutex::new(HashSet::new()),
        })
    }
}

/// Reaps series from one remote archive.
pub struct Reaper {
    pub(crate) remote: RemoteHandle,
    filter: IdentityFilter,
    partitioner: Partitioner,
    /// `None` when peripheral extraction is disabled.
    peripherals: Option<PeripheralRegistry>,
    scratch_root: Option<PathBuf>,
    output_dir: PathBuf,
    in_flight: Mutex<HashSet<String>>,
}

impl Reaper {
    pub fn filter(&self) -> &IdentityFilter {
        &self.filter
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Reaps one series into `scratch_dir`, which must be empty.
    ///
    /// Archives are sealed inside `scratch_dir`; the caller owns it and
    /// everything in it afterwards.
    #[instrument(skip_all, fields(series = %item.id))]
    pub async fn reap(&self, item: &WorkItem, scratch_dir: &Path) -> Outcome {
        if let Some(reason) = self.precheck(item) {
            return Outcome::Skipped(reason);
        }
        let Some(_claim) = Claim::acquire(&self.in_flight, &item.id) else {
            tracing::warn!("Series is already being reaped");
            return Outcome::Failed(Failure::InProgress);
        };
        self.reap_claimed(item, scratch_dir).await
    }

    /// Reaps one series in a fresh scratch directory and moves the sealed
    /// archives, with any peripheral output, into the output directory. The scratch directory is removed
    /// however the attempt ends.
    #[instrument(skip_all, fields(series = %item.id))]
    pub async fn reap_item(&self, item: &WorkItem) -> Outcome {
        if let Some(reason) = self.precheck(item) {
            return Outcome::Skipped(reason);
        }
        let Some(_claim) = Claim::acquire(&self.in_flight, &item.id) else {
            tracing::warn!("Series is already being reaped");
            return Outcome::Failed(Failure::InProgress);
        };
        let scratch = match self.scratch_dir() {
            Ok(scratch) => scratch,
            Err(e) => return e.into(),
        };
        match self.reap_claimed(item, scratch.path()).await {
            Outcome::Success(acquisitions) => match self.deliver(scratch.path(), acquisitions).await {
                Ok(acquisitions) => Outcome::Success(acquisitions),
                Err(e) => e.into(),
            },
            outcome => outcome,
        }
    }

    /// Checks that need nothing but the inventory entry.
    fn precheck(&self, item: &WorkItem) -> Option<SkipReason> {
        if item.state.images == 0 {
            tracing::info!("ignoring, no images");
            return Some(SkipReason::Empty);
        }
        if item.state.patient_id.is_empty() {
            return None;
        }
        self.screen(&item.state.patient_id)
    }

    fn screen(&self, patient_id: &str) -> Option<SkipReason> {
        let reason = SkipReason::from_verdict(self.filter.check(patient_id));
        match reason {
            Some(SkipReason::Denied) => tracing::info!(patient_id, "discarding"),
            Some(_) => tracing::info!(patient_id, pattern = self.filter.pattern(), "ignoring"),
            None => {},
        }
        reason
    }

    async fn reap_claimed(&self, item: &WorkItem, scratch_dir: &Path) -> Outcome {
        match self.retrieve_and_package(item, scratch_dir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = ?e, "failure");
                e.into()
            },
        }
    }

    async fn retrieve_and_package(&self, item: &WorkItem, scratch_dir: &Path) -> Result<Outcome> {
        tracing::info!(images = item.state.images, patient_id = %item.state.patient_id, "reaping");
        let started = Instant::now();
        let moved = self
            .remote
            .move_series(&SeriesQuery::for_series(&item.id), scratch_dir)
            .await
            .or_raise(|| ErrorKind::Network)?;
        let elapsed = started.elapsed();
        let files = list_files(scratch_dir).await?;
        if u32::try_from(files.len()).ok() != Some(moved.files_written) {
            tracing::warn!(reported = moved.files_written, present = files.len(), "Retrieved file count mismatch");
        }

        let complete = moved.success && moved.files_written == item.state.images;
        if let Some(first) = files.first() {
            match self.retrieved_patient_id(first) {
                Ok(patient_id) => {
                    if let Some(reason) = self.screen(&patient_id) {
                        return Ok(Outcome::Skipped(reason));
                    }
                },
                // A truncated transfer can leave the first record half written.
                Err(e) if !complete => tracing::debug!(error = ?e, "First retrieved record unreadable"),
                Err(e) => return Err(e),
            }
        }

        if !complete {
            tracing::warn!(
                expected = item.state.images,
                written = moved.files_written,
                reported_success = moved.success,
                "failure, incomplete retrieval"
            );
            return Ok(Outcome::Failed(Failure::Incomplete {
                expected: item.state.images,
                written: moved.files_written,
                reported_success: moved.success,
            }));
        }
        tracing::info!(files = files.len(), elapsed = ?elapsed, "reaped");

        let partitioner = self.partitioner.clone();
        let peripherals = self.peripherals.clone();
        let series_id = item.id.clone();
        let dir = scratch_dir.to_path_buf();
        let acquisitions = tokio::task::spawn_blocking(move || -> Result<Vec<Acquisition>> {
            let acquisitions = partitioner.partition(&files, &series_id, &dir)?;
            if let Some(peripherals) = peripherals {
                for acquisition in &acquisitions {
                    peripherals.run(&dir, acquisition, partitioner.codec().as_ref());
                }
            }
            Ok(acquisitions)
        })
        .await
        .or_raise(|| ErrorKind::Interrupted)??;
        Ok(Outcome::Success(acquisitions))
    }

    fn retrieved_patient_id(&self, path: &Path) -> Result<String> {
        let record = self.partitioner.codec().open(path, false).or_raise(|| ErrorKind::Record)?;
        let descriptor = RecordDescriptor::read(&record).or_raise(|| ErrorKind::Record)?;
        Ok(descriptor.patient_id)
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("reaper-");
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root).or_raise(|| ErrorKind::Io(root.clone()))?;
                builder.tempdir_in(root).or_raise(|| ErrorKind::Io(root.clone()))
            },
            None => builder.tempdir().or_raise(|| ErrorKind::Io(std::env::temp_dir())),
        }
    }

    /// Moves every file a successful reap left in `scratch_dir` (the sealed
    /// archives and whatever the peripheral extractors wrote) into the output
    /// directory. Either all of them arrive or none do.
    async fn deliver(&self, scratch_dir: &Path, acquisitions: Vec<Acquisition>) -> Result<Vec<Acquisition>> {
        let output_dir = &self.output_dir;
        tokio::fs::create_dir_all(output_dir).await.or_raise(|| ErrorKind::Io(output_dir.clone()))?;
        let mut delivered: Vec<PathBuf> = Vec::new();
        for file in list_files(scratch_dir).await? {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = output_dir.join(name);
            if let Err(e) = relocate(&file, &target).await {
                for path in &delivered {
                    if let Err(err) = tokio::fs::remove_file(path).await {
                        tracing::warn!(path = %path.display(), error = %err, "Could not withdraw delivered file");
                    }
                }
                return Err(e);
            }
            tracing::debug!(path = %target.display(), "delivered");
            delivered.push(target);
        }
        Ok(acquisitions
            .into_iter()
            .map(|mut acquisition| {
                if let Some(name) = acquisition.path.file_name() {
                    acquisition.path = output_dir.join(name);
                }
                acquisition
            })
            .collect())
    }
}

/// Regular files directly inside `dir`, sorted by name.
async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_error = || ErrorKind::Io(dir.to_path_buf());
    let mut entries = tokio::fs::read_dir(dir).await.or_raise(io_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.or_raise(io_error)? {
        if entry.file_type().await.or_raise(io_error)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Renames, falling back to copy-and-delete across filesystems.
async fn relocate(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    if let Err(e) = tokio::fs::copy(from, to).await {
        _ = tokio::fs::remove_file(to).await;
        return Err(e).or_raise(|| ErrorKind::Io(to.to_path_buf()));
    }
    let removed = tokio::fs::remove_file(from).await;
    if removed.is_err() {
        _ = tokio::fs::remove_file(to).await;
    }
    removed.or_raise(|| ErrorKind::Io(from.to_path_buf()))
}

/// Marks a series as in flight until dropped.
struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> Claim<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let mut guard = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        guard.insert(id.to_string()).then(|| Self {
            in_flight,
            id: id.to_string(),
        })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.id);
    }
}
