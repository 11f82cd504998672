//! Publish-date parsing for feed items.
//!
//! Dates are matched against an ordered list of patterns and the first one
//! that parses wins. The offset a pattern captures is kept as-is; a date
//! without zone information stays naive.
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

use super::resolve::{resolve_first, Candidate};

const NAIVE_ISO: &str = "%Y-%m-%dT%H:%M:%S";

/// A parsed publish date, zoned or naive depending on the source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubDate {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl PubDate {
    /// ISO-8601 rendering used at every storage and serialization boundary.
    pub fn to_iso8601(&self) -> String {
        match self {
            PubDate::Zoned(dt) => dt.to_rfc3339(),
            PubDate::Naive(dt) => dt.format(NAIVE_ISO).to_string(),
        }
    }

    /// Parses the output of [`PubDate::to_iso8601`] (and any RFC 3339 /
    /// naive ISO-8601 timestamp) back into a `PubDate`.
    pub fn from_iso8601(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(PubDate::Zoned(dt));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(PubDate::Naive)
    }
}

impl fmt::Display for PubDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Serialize for PubDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

/// One entry of the ordered pattern list.
#[derive(Debug, Clone, Copy)]
enum DateFormat {
    Rfc2822,
    Rfc3339,
    /// chrono pattern carrying a numeric offset (`%z` / `%:z`)
    Zoned(&'static str),
    /// RFC 2822 with the day-of-week dropped, so a wrong weekday still parses
    Rfc2822AnyWeekday,
    /// RFC 2822 layout ending in a zone abbreviation chrono does not know
    NamedZone,
    Naive(&'static str),
    DateOnly(&'static str),
}

const FORMATS: &[DateFormat] = &[
    DateFormat::Rfc2822,
    DateFormat::Zoned("%a, %d %b %Y %H:%M:%S %z"),
    DateFormat::Zoned("%a, %d %b %Y %H:%M %z"),
    DateFormat::Rfc2822AnyWeekday,
    DateFormat::NamedZone,
    DateFormat::Rfc3339,
    DateFormat::Zoned("%Y-%m-%dT%H:%M:%S%.f%:z"),
    DateFormat::Zoned("%Y-%m-%dT%H:%M:%S%.f%z"),
    DateFormat::Naive("%Y-%m-%dT%H:%M:%S%.f"),
    DateFormat::Naive("%Y-%m-%d %H:%M:%S"),
    DateFormat::DateOnly("%Y-%m-%d"),
    DateFormat::Naive("%d %b %Y %H:%M:%S"),
    DateFormat::Naive("%d.%m.%Y %H:%M"),
    DateFormat::DateOnly("%d.%m.%Y"),
];

/// Zone abbreviations seen in podcast feeds that RFC 2822 parsing rejects.
const NAMED_ZONES: &[(&str, i32)] = &[
    ("GMT", 0),
    ("UT", 0),
    ("Z", 0),
    ("UTC", 0),
    ("WET", 0),
    ("BST", 3600),
    ("CET", 3600),
    ("MET", 3600),
    ("WEST", 3600),
    ("CEST", 2 * 3600),
    ("MEST", 2 * 3600),
    ("EET", 2 * 3600),
    ("EEST", 3 * 3600),
    ("MSK", 3 * 3600),
    ("IST", 5 * 3600 + 1800),
    ("JST", 9 * 3600),
    ("KST", 9 * 3600),
    ("AEST", 10 * 3600),
    ("AEDT", 11 * 3600),
    ("NZST", 12 * 3600),
    ("NZDT", 13 * 3600),
    ("AKST", -9 * 3600),
    ("AKDT", -8 * 3600),
    ("HST", -10 * 3600),
];

/// Parses a feed date string, returning `None` when no pattern matches.
///
/// Callers decide what a missing date means; this function never invents
/// one.
pub fn parse_pub_date(raw: &str) -> Option<PubDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = resolve_first(
        FORMATS
            .iter()
            .map(|format| Candidate::new("date-format", *format)),
        |format| try_format(s, format),
    );
    if parsed.is_none() {
        tracing::debug!(value = %s, "Unrecognized publish date format");
    }
    parsed
}

fn try_format(s: &str, format: DateFormat) -> Option<PubDate> {
    match format {
        DateFormat::Rfc2822 => DateTime::parse_from_rfc2822(s).ok().map(PubDate::Zoned),
        DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(s).ok().map(PubDate::Zoned),
        DateFormat::Rfc2822AnyWeekday => without_weekday(s)
            .and_then(|rest| DateTime::parse_from_rfc2822(rest).ok())
            .map(PubDate::Zoned),
        DateFormat::Zoned(pattern) => DateTime::parse_from_str(s, pattern)
            .ok()
            .map(PubDate::Zoned),
        DateFormat::NamedZone => parse_named_zone(s),
        DateFormat::Naive(pattern) => NaiveDateTime::parse_from_str(s, pattern)
            .ok()
            .map(PubDate::Naive),
        DateFormat::DateOnly(pattern) => NaiveDate::parse_from_str(s, pattern)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(PubDate::Naive),
    }
}

fn parse_named_zone(s: &str) -> Option<PubDate> {
    let (base, zone) = s.rsplit_once(' ')?;
    let offset_secs = NAMED_ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
        .map(|(_, secs)| *secs)?;
    let offset = FixedOffset::east_opt(offset_secs)?;
    let base = base.trim();
    let base = without_weekday(base).unwrap_or(base);

    ["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M"]
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(base, pattern).ok())
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .map(PubDate::Zoned)
}

/// Strips a leading `Day,` so a weekday that disagrees with the date is
/// ignored. `None` when there is no such prefix.
fn without_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(',')?;
    let day = day.trim();
    (!day.is_empty() && day.chars().all(|c| c.is_ascii_alphabetic())).then(|| rest.trim_start())
}
