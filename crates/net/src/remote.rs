use crate::SeriesQuery;
use crate::error::Result;
use async_trait::async_trait;
use reaper_record::Record;
use std::path::Path;

/// What the protocol engine reports after a retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Whether the remote reported the transfer as complete.
    pub success: bool,
    /// Number of files the engine wrote to the destination directory.
    pub files_written: u32,
}

/// The query/retrieve engine talking to one remote archive.
///
/// Implementations own the wire protocol, association handling and the
/// listener that receives pushed files. Both operations are long,
/// network-bound calls; neither retries internally.
#[async_trait]
pub trait RemoteArchive: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Series-level find. Every matching series yields one record holding the
    /// template's attributes as filled in by the remote. An empty result is
    /// not an error.
    async fn find(&self, query: &SeriesQuery) -> Result<Vec<Record>>;

    /// Retrieves every file matching `query` into `destination`, one record
    /// per file. A partial transfer is reported through the outcome rather
    /// than as an error; errors mean the operation could not be carried out.
    async fn move_series(&self, query: &SeriesQuery, destination: &Path) -> Result<MoveOutcome>;
}
