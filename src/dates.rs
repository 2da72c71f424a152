/// Timestamp parsing and formatting shared by the trigger and the artifacts.
///
/// Export records carry ISO-8601 strings, the archive table returns
/// `timestamptz` values and tweets in the raw archive use the legacy
/// `Wed Oct 10 20:19:24 +0000 2018` form. All of them end up as `DateTime<Utc>`
/// so comparisons are done on instants, never on strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

const ARCHIVE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Parse any timestamp format found in the data exports
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_str(raw, ARCHIVE_FORMAT) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Postgres text output, e.g. "2024-02-15 10:00:00+00"
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Format as ISO-8601 UTC with millisecond precision (`2024-02-15T00:00:00.000Z`)
pub fn to_iso(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
