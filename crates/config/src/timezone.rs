use chrono::{NaiveDate, TimeDelta, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::PrimitiveDateTime;

/// An IANA timezone, validated on parse.
///
/// Record timestamps carry no offset; this is the zone they are taken to be
/// local to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timezone(Tz);

impl Timezone {
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Seconds since the Unix epoch of a local wall-clock time.
    ///
    /// Ambiguous times (clocks going back) resolve to the earlier instant.
    /// Times skipped by clocks going forward are shifted forward an hour.
    pub fn unix_timestamp(&self, local: PrimitiveDateTime) -> i64 {
        let naive = NaiveDate::from_ymd_opt(local.year(), u32::from(u8::from(local.month())), u32::from(local.day()))
            .and_then(|date| {
                date.and_hms_opt(u32::from(local.hour()), u32::from(local.minute()), u32::from(local.second()))
            });
        let Some(naive) = naive else {
            return local.assume_utc().unix_timestamp();
        };
        self.0
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| self.0.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
            .map_or_else(|| naive.and_utc().timestamp(), |dt| dt.timestamp())
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(Tz::UTC)
    }
}

impl FromStr for Timezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<Tz>().map(Self).map_err(|_| format!("unknown timezone: {s}"))
    }
}

impl TryFrom<String> for Timezone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timezone> for String {
    fn from(value: Timezone) -> Self {
        value.name().to_string()
    }
}

impl Display for Timezone {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}
