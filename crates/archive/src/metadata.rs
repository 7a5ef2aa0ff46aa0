use serde::{Deserialize, Serialize};

/// Provenance metadata embedded in every sealed archive.
///
/// Serialized as JSON into the archive comment so downstream consumers can
/// read it without extracting any entry:
///
/// ```json
/// {"filetype":"dicom","timezone":"Europe/London","overwrite":{"firstname_hash":"…","lastname_hash":null}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Record-format tag of the archived records.
    #[serde(rename = "filetype")]
    pub format_tag: String,
    /// IANA timezone the records' naive timestamps are local to.
    pub timezone: String,
    #[serde(rename = "overwrite")]
    pub identity: IdentityOverwrite,
}

/// Pseudonymous identity that replaces the names stripped from the records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityOverwrite {
    #[serde(rename = "firstname_hash")]
    pub first_name_hash: Option<String>,
    #[serde(rename = "lastname_hash")]
    pub last_name_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_keys() {
        let metadata = ArchiveMetadata {
            format_tag: "dicom".to_string(),
            timezone: "UTC".to_string(),
            identity: IdentityOverwrite {
                first_name_hash: Some("abc".to_string()),
                last_name_hash: None,
            },
        };
        let json: serde_json::Value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "filetype": "dicom",
                "timezone": "UTC",
                "overwrite": { "firstname_hash": "abc", "lastname_hash": null },
            })
        );
    }
}
