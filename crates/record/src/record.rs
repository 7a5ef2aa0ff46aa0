use std::collections::BTreeMap;

/// A single imaging record: named text attributes plus an optional pixel
/// payload.
///
/// The reaper never interprets pixel data. It is only carried so that a
/// record opened with pixels can be saved back without losing them; a record
/// opened without pixels must not be saved over its source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    fields: BTreeMap<String, String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pixels: Option<Vec<u8>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, field: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    #[must_use]
    pub fn with_pixels(mut self, pixels: impl Into<Vec<u8>>) -> Self {
        self.pixels = Some(pixels.into());
        self
    }

    /// Looks up a field, treating blank (whitespace-only) values as absent.
    ///
    /// Record formats pad values with spaces, so the returned value is trimmed.
    pub fn get(&self, field: impl AsRef<str>) -> Option<&str> {
        self.fields.get(field.as_ref()).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, field: impl AsRef<str>) -> bool {
        self.fields.contains_key(field.as_ref())
    }

    pub fn set(&mut self, field: impl AsRef<str>, value: impl Into<String>) {
        self.fields.insert(field.as_ref().to_string(), value.into());
    }

    pub fn remove(&mut self, field: impl AsRef<str>) -> Option<String> {
        self.fields.remove(field.as_ref())
    }

    pub fn pixels(&self) -> Option<&[u8]> {
        self.pixels.as_deref()
    }

    /// Strips the pixel payload, as if the record had been opened without it.
    #[must_use]
    pub fn without_pixels(mut self) -> Self {
        self.pixels = None;
        self
    }
}
