//! Remote inventory snapshots.
//!
//! The scheduler diffs successive snapshots to decide what to reap; this
//! module only produces them.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use reaper_net::{RemoteArchive, SeriesQuery};
use reaper_record::Field;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::{IntoIter, Iter};
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::instrument;

/// What the remote declares about one series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemState {
    /// Declared number of images; the completeness oracle for retrieval.
    pub images: u32,
    /// May be empty.
    pub patient_id: String,
}

/// One series to reap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Series instance UID.
    pub id: String,
    pub state: ItemState,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, state: ItemState) -> Self {
        Self { id: id.into(), state }
    }
}

impl Display for WorkItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({} images, {} patient_id)", self.id, self.state.images, self.state.patient_id)
    }
}

/// Series id → declared state, as of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory(BTreeMap<String, ItemState>);

impl Inventory {
    pub fn get(&self, id: &str) -> Option<&ItemState> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replaces any earlier state for `id`.
    pub fn insert(&mut self, id: impl Into<String>, state: ItemState) -> Option<ItemState> {
        self.0.insert(id.into(), state)
    }

    pub fn iter(&self) -> Iter<'_, String, ItemState> {
        self.0.iter()
    }

    /// Every series as a work item, ordered by id.
    pub fn items(&self) -> impl Iterator<Item = WorkItem> + '_ {
        self.0.iter().map(|(id, state)| WorkItem::new(id.clone(), state.clone()))
    }
}

impl FromIterator<(String, ItemState)> for Inventory {
    fn from_iter<T: IntoIterator<Item = (String, ItemState)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Inventory {
    type Item = (String, ItemState);
    type IntoIter = IntoIter<String, ItemState>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = (&'a String, &'a ItemState);
    type IntoIter = Iter<'a, String, ItemState>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Queries the remote for every series and its declared image count.
///
/// An empty response is a valid, empty inventory. When the remote lists a
/// series twice the later record wins.
///
/// # Errors
/// - [`ErrorKind::Network`] when the find fails.
/// - [`ErrorKind::Inventory`] when a record has no series id, or a declared
///   count that isn't a non-negative integer. A blank count reads as zero.
#[instrument(skip_all, fields(remote = remote.name()))]
pub async fn query(remote: &dyn RemoteArchive) -> Result<Inventory> {
    let records = remote.find(&SeriesQuery::inventory()).await.or_raise(|| ErrorKind::Network)?;
    let mut inventory = Inventory::default();
    for record in records {
        let Some(id) = record.get(Field::SeriesInstanceUid) else {
            tracing::warn!("Inventory record without a series id");
            exn::bail!(ErrorKind::Inventory);
        };
        let images = match record.get(Field::NumberOfSeriesRelatedInstances) {
            Some(count) => count.parse::<u32>().or_raise(|| ErrorKind::Inventory)?,
            None => 0,
        };
        let state = ItemState {
            images,
            patient_id: record.get(Field::PatientId).unwrap_or_default().to_string(),
        };
        inventory.insert(id, state);
    }
    tracing::debug!(series = inventory.len(), "Inventory received");
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reaper_net::MockArchive;
    use reaper_record::Record;
    use rstest::rstest;

    fn inventory_record(id: &str, count: &str, patient_id: &str) -> Record {
        Record::new()
            .with(Field::SeriesInstanceUid, id)
            .with(Field::NumberOfSeriesRelatedInstances, count)
            .with(Field::PatientId, patient_id)
    }

    #[tokio::test]
    async fn test_query() {
        let remote = MockArchive::default()
            .with_series("1.1", "ex1", [("1", b"x"), ("2", b"y")])
            .with_series("1.2", "", [("1", b"z")]);
        let inventory = query(&remote).await.unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(
            inventory.get("1.1"),
            Some(&ItemState {
                images: 2,
                patient_id: "ex1".to_string()
            })
        );
        assert_eq!(inventory.get("1.2").unwrap().patient_id, "");
        let items: Vec<String> = inventory.items().map(|item| item.to_string()).collect();
        assert_eq!(items, vec!["1.1 (2 images, ex1 patient_id)", "1.2 (1 images,  patient_id)"]);
    }

    #[tokio::test]
    async fn test_empty_inventory() {
        let inventory = query(&MockArchive::default()).await.unwrap();
        assert!(inventory.is_empty());
    }

    #[tokio::test]
    async fn test_last_duplicate_wins() {
        let remote = MockArchive::default()
            .with_inventory_record(inventory_record("1.1", "3", "a"))
            .with_inventory_record(inventory_record("1.1", "5", "b"));
        let inventory = query(&remote).await.unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.get("1.1").unwrap().images, 5);
    }

    #[tokio::test]
    async fn test_blank_count_is_zero() {
        let remote = MockArchive::default().with_inventory_record(inventory_record("1.1", "  ", "a"));
        assert_eq!(query(&remote).await.unwrap().get("1.1").unwrap().images, 0);
    }

    #[rstest]
    #[case::missing_id(inventory_record("", "3", "a"))]
    #[case::negative_count(inventory_record("1.1", "-1", "a"))]
    #[case::text_count(inventory_record("1.1", "many", "a"))]
    #[tokio::test]
    async fn test_malformed(#[case] record: Record) {
        let remote = MockArchive::default().with_inventory_record(record);
        let err = query(&remote).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Inventory));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_communication_failure() {
        let err = query(&MockArchive::default().failing_find()).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Network));
    }

    #[test]
    fn test_state_round_trips_for_persistence() {
        let inventory: Inventory = [("1.1".to_string(), ItemState { images: 4, patient_id: "ex1".to_string() })]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&inventory).unwrap();
        assert_eq!(json, r#"{"1.1":{"images":4,"patient_id":"ex1"}}"#);
        assert_eq!(serde_json::from_str::<Inventory>(&json).unwrap(), inventory);
    }
}
