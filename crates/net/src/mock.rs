//! In-memory remote archive for testing.

use crate::error::{ErrorKind, Result};
use crate::{MoveOutcome, RemoteArchive, SeriesQuery};
use async_trait::async_trait;
use reaper_record::{Field, Record};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

struct MockSeries {
    inventory: Record,
    files: Vec<(String, Vec<u8>)>,
    deliver: Option<usize>,
    success: bool,
}

/// In-memory remote archive for testing.
///
/// Holds a list of series, each with the inventory record [`find`] returns
/// for it and the files [`move_series`] delivers. Deliveries can be
/// truncated and either operation can be made to fail, to exercise partial
/// retrievals and communication failures. Calls are counted.
///
/// [`find`]: RemoteArchive::find
/// [`move_series`]: RemoteArchive::move_series
///
/// # Examples
///
/// ```
/// use reaper_net::{MockArchive, RemoteArchive, SeriesQuery};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = MockArchive::default().with_series("1.2.3", "ex1", [("1.dcm", b"...")]);
/// let records = remote.find(&SeriesQuery::inventory()).await?;
/// assert_eq!(records[0].get("NumberOfSeriesRelatedInstances"), Some("1"));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockArchive {
    series: RwLock<Vec<MockSeries>>,
    extra: RwLock<Vec<Record>>,
    fail_find: bool,
    fail_move: bool,
    finds: AtomicUsize,
    moves: AtomicUsize,
}

impl MockArchive {
    /// Adds a series whose declared count matches its files.
    pub fn with_series(
        mut self,
        series_uid: &str,
        patient_id: &str,
        files: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>,
    ) -> Self {
        let files: Vec<(String, Vec<u8>)> = files.into_iter().map(|(n, d)| (n.into(), d.into())).collect();
        let inventory = Record::new()
            .with(Field::StudyInstanceUid, "1")
            .with(Field::SeriesInstanceUid, series_uid)
            .with(Field::NumberOfSeriesRelatedInstances, files.len().to_string())
            .with(Field::PatientId, patient_id);
        self.series.get_mut().push(MockSeries {
            inventory,
            files,
            deliver: None,
            success: true,
        });
        self
    }

    /// Appends a raw record to every find response.
    pub fn with_inventory_record(mut self, record: Record) -> Self {
        self.extra.get_mut().push(record);
        self
    }

    /// Delivers only the first `count` files of a series, still reporting
    /// success.
    ///
    /// Panics if the series was not added first.
    pub fn delivering(mut self, series_uid: &str, count: usize) -> Self {
        self.series_mut(series_uid).deliver = Some(count);
        self
    }

    /// Makes retrieval of a series report failure after writing its files.
    ///
    /// Panics if the series was not added first.
    pub fn reporting_failure(mut self, series_uid: &str) -> Self {
        self.series_mut(series_uid).success = false;
        self
    }

    pub fn failing_find(mut self) -> Self {
        self.fail_find = true;
        self
    }

    pub fn failing_move(mut self) -> Self {
        self.fail_move = true;
        self
    }

    pub fn find_calls(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn move_calls(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    fn series_mut(&mut self, series_uid: &str) -> &mut MockSeries {
        let Some(series) = self
            .series
            .get_mut()
            .iter_mut()
            .find(|s| s.inventory.get(Field::SeriesInstanceUid) == Some(series_uid))
        else {
            // The panic here is DELIBERATE. Test setup is wrong.
            panic!("MockArchive: unknown series {series_uid}");
        };
        series
    }
}

#[async_trait]
impl RemoteArchive for MockArchive {
    fn name(&self) -> &str {
        "mock"
    }

    async fn find(&self, query: &SeriesQuery) -> Result<Vec<Record>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if self.fail_find {
            exn::bail!(ErrorKind::Communication("association rejected".to_string()));
        }
        let wanted = query.series_uid();
        let mut records: Vec<Record> = self
            .series
            .read()
            .await
            .iter()
            .map(|s| &s.inventory)
            .filter(|r| wanted.is_none() || r.get(Field::SeriesInstanceUid) == wanted)
            .cloned()
            .collect();
        records.extend(self.extra.read().await.iter().cloned());
        Ok(records)
    }

    async fn move_series(&self, query: &SeriesQuery, destination: &Path) -> Result<MoveOutcome> {
        self.moves.fetch_add(1, Ordering::SeqCst);
        if self.fail_move {
            exn::bail!(ErrorKind::Communication("association aborted".to_string()));
        }
        let Some(wanted) = query.series_uid() else {
            return Ok(MoveOutcome::default());
        };
        // Snapshot under the read lock, then drop it before writing files.
        let delivery: Option<(Vec<(String, Vec<u8>)>, bool)> = {
            let guard = self.series.read().await;
            guard
                .iter()
                .find(|s| s.inventory.get(Field::SeriesInstanceUid) == Some(wanted))
                .map(|s| {
                    let count = s.deliver.unwrap_or(s.files.len()).min(s.files.len());
                    (s.files[..count].to_vec(), s.success)
                })
        };
        let Some((files, success)) = delivery else {
            return Ok(MoveOutcome {
                success: true,
                files_written: 0,
            });
        };
        for (name, data) in &files {
            let path = destination.join(name);
            if tokio::fs::write(&path, data).await.is_err() {
                exn::bail!(ErrorKind::Io(path));
            }
        }
        tracing::debug!(series = wanted, files = files.len(), "Mock retrieval complete");
        Ok(MoveOutcome {
            success,
            files_written: u32::try_from(files.len()).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_filters_by_series() {
        let remote = MockArchive::default()
            .with_series("1.1", "a", [("1.dcm", b"x")])
            .with_series("1.2", "b", [("1.dcm", b"y"), ("2.dcm", b"z")]);
        assert_eq!(remote.find(&SeriesQuery::inventory()).await.unwrap().len(), 2);
        let records = remote.find(&SeriesQuery::for_series("1.2")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Field::NumberOfSeriesRelatedInstances), Some("2"));
        assert_eq!(remote.find_calls(), 2);
    }

    #[tokio::test]
    async fn test_truncated_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockArchive::default()
            .with_series("1.1", "a", [("1.dcm", b"x"), ("2.dcm", b"y")])
            .delivering("1.1", 1);
        let outcome = remote.move_series(&SeriesQuery::for_series("1.1"), dir.path()).await.unwrap();
        assert_eq!(
            outcome,
            MoveOutcome {
                success: true,
                files_written: 1
            }
        );
        assert!(dir.path().join("1.dcm").exists());
        assert!(!dir.path().join("2.dcm").exists());
    }

    #[tokio::test]
    async fn test_failures() {
        let dir = tempfile::tempdir().unwrap();
        let remote = MockArchive::default().failing_find().failing_move();
        let err = remote.find(&SeriesQuery::inventory()).await.unwrap_err();
        assert!(err.is_retryable());
        let err = remote.move_series(&SeriesQuery::for_series("1"), dir.path()).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Communication(_)));
        assert_eq!(remote.move_calls(), 1);
    }
}
