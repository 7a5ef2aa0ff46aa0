use reaper_record::Field;
use std::collections::BTreeMap;

/// A series-level query template.
///
/// Attributes with a value restrict the match; attributes with an empty value
/// are return keys the remote fills in on each matching record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesQuery {
    attributes: BTreeMap<Field, String>,
}

impl SeriesQuery {
    /// Every series with the attributes needed to build an inventory.
    pub fn inventory() -> Self {
        [
            Field::StudyInstanceUid,
            Field::SeriesInstanceUid,
            Field::StudyId,
            Field::SeriesNumber,
            Field::SeriesDate,
            Field::SeriesTime,
            Field::NumberOfSeriesRelatedInstances,
            Field::PatientId,
        ]
        .into_iter()
        .fold(Self::default(), |query, field| query.with(field, ""))
    }

    /// Exactly one series, for retrieval.
    pub fn for_series(series_uid: impl Into<String>) -> Self {
        Self::default().with(Field::SeriesInstanceUid, series_uid)
    }

    #[must_use]
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.attributes.insert(field, value.into());
        self
    }

    /// The value of an attribute, `Some("")` for a return key.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.attributes.get(&field).map(String::as_str)
    }

    /// The series this query is restricted to, if any.
    pub fn series_uid(&self) -> Option<&str> {
        self.get(Field::SeriesInstanceUid).filter(|uid| !uid.is_empty())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (Field, &str)> {
        self.attributes.iter().map(|(field, value)| (*field, value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_template_is_all_return_keys() {
        let query = SeriesQuery::inventory();
        assert_eq!(query.attributes().count(), 8);
        assert!(query.attributes().all(|(_, value)| value.is_empty()));
        assert_eq!(query.get(Field::NumberOfSeriesRelatedInstances), Some(""));
        assert_eq!(query.series_uid(), None);
    }

    #[test]
    fn test_for_series() {
        let query = SeriesQuery::for_series("1.2.3");
        assert_eq!(query.series_uid(), Some("1.2.3"));
        assert_eq!(query.get(Field::PatientId), None);
    }
}
