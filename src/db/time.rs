use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::AppError;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical storage format: RFC3339 / ISO-8601 in UTC with a `Z` suffix.
pub fn to_utc_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses stored timestamps back to UTC:
/// - RFC3339 / ISO-8601 (with offset or `Z`)
/// - legacy `YYYY-MM-DD HH:mm:ss` (interpreted as UTC)
pub fn parse_utc_string(s: &str) -> crate::error::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| AppError::TimeParse(e.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Column-mapper variant: folds a parse failure into a rusqlite conversion
/// error so row mappers stay on `rusqlite::Result`.
pub fn parse_utc_column(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_utc_string(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })
}
