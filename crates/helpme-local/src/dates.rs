//! Relative date phrases ("today", "next week", ...) rewritten into absolute dates before a
//! query reaches the search provider.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex, RegexBuilder};
use std::sync::OnceLock;

/// Zone used when nothing else is configured.
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

/// Where "today" is. A named zone follows daylight saving; a fixed offset never moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self::Named(chrono_tz::America::Chicago)
    }
}

impl ReferenceZone {
    /// IANA zone name, e.g. `Europe/Berlin`.
    pub fn named(name: &str) -> Option<Self> {
        name.trim().parse::<Tz>().ok().map(Self::Named)
    }

    /// Seconds east of UTC; `None` when out of range.
    pub fn fixed(offset_secs: i32) -> Option<Self> {
        FixedOffset::east_opt(offset_secs).map(Self::Fixed)
    }

    pub fn label(&self) -> String {
        match self {
            Self::Named(tz) => tz.name().to_string(),
            Self::Fixed(o) => o.to_string(),
        }
    }

    /// The instant `utc` as wall-clock time in this zone.
    pub fn localize(&self, utc: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Named(tz) => {
                let local = utc.with_timezone(tz);
                local.with_timezone(&local.offset().fix())
            }
            Self::Fixed(o) => utc.with_timezone(o),
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.localize(Utc::now())
    }
}

const DATE_FORMAT: &str = "%B %d, %Y";

fn phrase_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(
            r"\b(today|tomorrow|yesterday|last\s+week|next\s+week|last\s+month|this\s+month)\b",
        )
        .case_insensitive(true)
        .build()
        .ok()
    })
    .as_ref()
}

fn day_offset(phrase: &str) -> i64 {
    let norm = phrase
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    match norm.as_str() {
        "tomorrow" => 1,
        "yesterday" => -1,
        "last week" => -7,
        "next week" => 7,
        "last month" => -30,
        // today, this month
        _ => 0,
    }
}

/// Long-form date, e.g. "March 05, 2025".
pub fn long_date(d: &DateTime<FixedOffset>) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Replace every relative date phrase in `query` with the absolute date it denotes.
///
/// All phrases are replaced in one left-to-right pass; text between matches is untouched.
pub fn rewrite_relative_dates(query: &str, now: DateTime<FixedOffset>) -> String {
    let Some(re) = phrase_regex() else {
        return query.to_string();
    };
    re.replace_all(query, |caps: &Captures| {
        let d = now + Duration::days(day_offset(&caps[1]));
        long_date(&d)
    })
    .into_owned()
}
