//! Reaper configuration.
//!
//! Settings are layered with `figment`: built-in defaults, then a TOML, YAML
//! or JSON file, then `REAPER_*` environment variables. Only the remote
//! archive's connection parameters are required.

mod config;
pub mod error;
mod timezone;

pub use crate::config::{Config, ENV_PREFIX, default_path};
pub use crate::timezone::Timezone;
