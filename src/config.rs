use std::fmt::Write;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// How date ranges and timezones are passed to resource sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Request parameter carrying the range start.
    pub start_param: String,
    /// Request parameter carrying the range end.
    pub end_param: String,
    pub timezone_param: String,
    /// Calendar timezone. `None` (or "local") sends no timezone parameter.
    pub timezone: Option<String>,
    /// strftime-style format used to serialize range bounds.
    pub date_format: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            start_param: "start".into(),
            end_param: "end".into(),
            timezone_param: "timezone".into(),
            timezone: None,
            date_format: DEFAULT_DATE_FORMAT.into(),
        }
    }
}

impl ResourceConfig {
    /// Defaults overridden by `RESCACHE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            start_param: lookup("RESCACHE_START_PARAM").unwrap_or(defaults.start_param),
            end_param: lookup("RESCACHE_END_PARAM").unwrap_or(defaults.end_param),
            timezone_param: lookup("RESCACHE_TIMEZONE_PARAM").unwrap_or(defaults.timezone_param),
            timezone: lookup("RESCACHE_TIMEZONE").filter(|tz| !tz.is_empty()),
            date_format: lookup("RESCACHE_DATE_FORMAT").unwrap_or(defaults.date_format),
        }
    }

    /// The timezone to hand to sources, if it isn't the local one.
    pub fn effective_timezone(&self) -> Option<&str> {
        self.timezone
            .as_deref()
            .filter(|tz| !tz.is_empty() && *tz != "local")
    }

    /// Serialize a range bound. A broken format falls back to ISO 8601.
    pub fn format_date(&self, t: NaiveDateTime) -> String {
        let mut out = String::new();
        if write!(out, "{}", t.format(&self.date_format)).is_err() {
            out.clear();
            let _ = write!(out, "{}", t.format(DEFAULT_DATE_FORMAT));
        }
        out
    }
}
