//! Patient-level filtering.
//!
//! Two policies, fixed at startup, decide whether a patient's series are
//! reaped at all: an allow pattern every id must match, and a deny list of
//! ids that are never reaped.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Outcome of checking a patient id against the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    /// The id does not match the allow pattern.
    NonMatching,
    /// The id is on the deny list.
    Denied,
}

impl Verdict {
    #[inline]
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Allowed => "allowed",
            Self::NonMatching => "not matching allow pattern",
            Self::Denied => "on deny list",
        })
    }
}

#[derive(Debug, Clone)]
pub struct IdentityFilter {
    pattern: String,
    allow: Regex,
    deny: HashSet<String>,
}

impl IdentityFilter {
    /// Compiles the filter.
    ///
    /// In `allow_pattern`, `*` matches any run of characters (including none)
    /// and every other character matches itself. The pattern only has to
    /// match the start of an id: `ex` allows `ex1234`.
    ///
    /// # Errors
    /// [`ErrorKind::Filter`] if the resulting expression is too large to
    /// compile.
    pub fn new(allow_pattern: &str, deny_list: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let expression = allow_pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
        let allow = Regex::new(&format!("^(?s:{expression})")).or_raise(|| ErrorKind::Filter)?;
        Ok(Self {
            pattern: allow_pattern.to_string(),
            allow,
            deny: deny_list.into_iter().map(|id| normalize(id.as_ref())).collect(),
        })
    }

    /// Allows everyone.
    pub fn permissive() -> Result<Self> {
        Self::new("*", [""; 0])
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Checks a patient id. Pure; the allow pattern is checked first.
    pub fn check(&self, patient_id: &str) -> Verdict {
        if !self.allow.is_match(patient_id) {
            Verdict::NonMatching
        } else if self.deny.contains(&normalize(patient_id)) {
            Verdict::Denied
        } else {
            Verdict::Allowed
        }
    }

    pub fn is_allowed(&self, patient_id: &str) -> bool {
        self.check(patient_id).is_allowed()
    }
}

/// Strips one leading and one trailing `/`, then case-folds.
fn normalize(patient_id: &str) -> String {
    let id = patient_id.strip_prefix('/').unwrap_or(patient_id);
    let id = id.strip_suffix('/').unwrap_or(id);
    id.to_lowercase()
}
