use crate::Timezone;
use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use reaper_net::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Prefix of environment variables that override file settings. Nested keys
/// are separated by a double underscore: `REAPER_REMOTE__HOST`.
pub const ENV_PREFIX: &str = "REAPER_";

/// Reaper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Remote archive to reap from. Required.
    pub remote: Endpoint,
    /// Patient ids must match this pattern to be reaped; `*` matches any run
    /// of characters and the match is anchored at the start only.
    #[serde(default = "default_allow_pattern")]
    pub allow_pattern: String,
    /// Patient ids never to reap, compared case-insensitively with a single
    /// leading and trailing `/` ignored.
    #[serde(default)]
    pub deny_list: Vec<String>,
    /// Strip patient names and birth dates from archived records.
    #[serde(default = "default_anonymize")]
    pub anonymize: bool,
    /// Zone the records' timestamps are local to.
    #[serde(default)]
    pub timezone: Timezone,
    /// Run the peripheral extractors after each acquisition is packaged.
    #[serde(default)]
    pub peripheral_extraction: bool,
    /// Data source of each peripheral extractor, by extractor name.
    #[serde(default)]
    pub peripheral: BTreeMap<String, PathBuf>,
    /// Where per-attempt scratch directories are created. Defaults to the
    /// system temporary directory.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
    /// Where sealed archives are delivered.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_allow_pattern() -> String {
    "*".to_string()
}

fn default_anonymize() -> bool {
    true
}

/// `<data dir>/reaper/archives`, or `archives` relative to the working
/// directory when the platform has no data dir.
fn default_output_dir() -> PathBuf {
    BaseDirs::new().map_or_else(
        || PathBuf::from("archives"),
        |dirs| dirs.data_dir().join("reaper").join("archives"),
    )
}

impl Config {
    /// Loads the configuration from `path` (or the default location, when it
    /// exists), with `REAPER_*` environment variables layered on top.
    #[instrument(skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// Builds the provider stack without extracting it.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new();
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(default) = default_path()
                    && default.is_file()
                {
                    tracing::debug!(path = %default.display(), "Using default configuration file");
                    figment = merge_file(figment, &default)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extracts and validates a configuration from any provider stack.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Invalid)?;
        config.remote.validate().or_raise(|| ErrorKind::Remote)?;
        if config.allow_pattern.is_empty() {
            exn::bail!(ErrorKind::Invalid);
        }
        Ok(config)
    }
}

/// `<config dir>/reaper/config.toml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.config_dir().join("reaper").join("config.toml"))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const REMOTE_TOML: &str = r#"
[remote]
host = "pacs.example.org"
port = 104
return_port = 4006
aet = "REAPER"
aec = "PACS"
"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", REMOTE_TOML);
        let config = Config::from_figment(Figment::new().merge(Toml::file_exact(&path))).unwrap();
        assert_eq!(config.allow_pattern, "*");
        assert!(config.deny_list.is_empty());
        assert!(config.anonymize);
        assert_eq!(config.timezone, Timezone::default());
        assert!(!config.peripheral_extraction);
        assert!(config.peripheral.is_empty());
        assert_eq!(config.scratch_root, None);
        assert_eq!(config.output_dir, default_output_dir());
        assert_eq!(config.remote.port, 104);
    }

    #[test]
    fn test_full_toml() {
        let dir = tempfile::tempdir().unwrap();
        let contents = format!(
            r#"
allow_pattern = "ex*"
deny_list = ["/Discard/", "test"]
anonymize = false
timezone = "Europe/London"
peripheral_extraction = true
scratch_root = "/var/tmp/reaper"
output_dir = "/srv/reaper"

[peripheral]
physio = "/data/physio"
{REMOTE_TOML}"#
        );
        let path = write(dir.path(), "config.toml", &contents);
        let config = Config::from_figment(Figment::new().merge(Toml::file_exact(&path))).unwrap();
        assert_eq!(config.allow_pattern, "ex*");
        assert_eq!(config.deny_list, vec!["/Discard/", "test"]);
        assert!(!config.anonymize);
        assert_eq!(config.timezone.name(), "Europe/London");
        assert_eq!(config.peripheral.get("physio"), Some(&PathBuf::from("/data/physio")));
        assert_eq!(config.scratch_root, Some(PathBuf::from("/var/tmp/reaper")));
        assert_eq!(config.output_dir, PathBuf::from("/srv/reaper"));
    }

    #[rstest]
    #[case::yaml(
        "config.yaml",
        "remote:\n  host: pacs\n  port: 104\n  return_port: 4006\n  aet: REAPER\n  aec: PACS\ntimezone: America/New_York\n"
    )]
    #[case::json(
        "config.json",
        r#"{"remote":{"host":"pacs","port":104,"return_port":4006,"aet":"REAPER","aec":"PACS"},"timezone":"America/New_York"}"#
    )]
    fn test_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), name, contents);
        let figment = Figment::new();
        let config = Config::from_figment(merge_file(figment, &path).unwrap()).unwrap();
        assert_eq!(config.remote.host, "pacs");
        assert_eq!(config.timezone.name(), "America/New_York");
    }

    #[test]
    fn test_missing_remote() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", "anonymize = true\n");
        let err = Config::from_figment(Figment::new().merge(Toml::file_exact(&path))).unwrap_err();
        assert_eq!(*err, ErrorKind::Invalid);
    }

    #[test]
    fn test_unusable_remote() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", &REMOTE_TOML.replace("\"PACS\"", "\"\""));
        let err = Config::from_figment(Figment::new().merge(Toml::file_exact(&path))).unwrap_err();
        assert_eq!(*err, ErrorKind::Remote);
    }

    #[test]
    fn test_unknown_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.toml", &format!("timezone = \"Mars/Olympus\"\n{REMOTE_TOML}"));
        let err = Config::from_figment(Figment::new().merge(Toml::file_exact(&path))).unwrap_err();
        assert_eq!(*err, ErrorKind::Invalid);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(path));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.ini", "remote=1");
        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat(path));
    }
}
