//! Helpers shared by the SQLite repositories.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use ledgersync_core::errors::{Error, Result, ValidationError};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Maximum number of parameters for SQLite IN (...) queries.
///
/// SQLite caps the number of bound parameters per statement (typically 999),
/// so ID lists are split into chunks of this size.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Chunk a slice into smaller slices for batch SQLite queries.
///
/// ```ignore
/// let mut total = 0;
/// for chunk in chunk_for_sqlite(&account_ids) {
///     total += count_with_in_clause(chunk)?;
/// }
/// ```
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_MAX_PARAMS_CHUNK)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(value, DATE_FORMAT)?)
}

pub fn parse_optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value.map(parse_date).transpose()
}

/// Decimals are stored as text to keep every digit.
pub fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| {
        Error::Validation(ValidationError::InvalidInput(format!(
            "Stored decimal '{}' is invalid: {}",
            value, e
        )))
    })
}

/// Fixed-width UTC form, so text ordering matches time ordering.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub fn parse_optional_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(parse_timestamp).transpose()
}

pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_chunk_for_sqlite_empty() {
        let items: Vec<i32> = vec![];
        assert_eq!(chunk_for_sqlite(&items).count(), 0);
    }

    #[test]
    fn test_chunk_for_sqlite_over_limit() {
        let items: Vec<i32> = (0..1200).collect();
        let chunks: Vec<_> = chunk_for_sqlite(&items).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), SQLITE_MAX_PARAMS_CHUNK);
        assert_eq!(chunks[2].len(), 200);
    }

    #[test]
    fn test_decimal_text_keeps_precision() {
        assert_eq!(parse_decimal("1234.567890").unwrap(), dec!(1234.567890));
        assert!(parse_decimal("12,5").is_err());
    }

    #[test]
    fn test_date_and_timestamp_parsing() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(parse_date(&format_date(date)).unwrap(), date);
        assert!(parse_date("2024/02/29").is_err());

        let at = parse_timestamp("2024-02-29T10:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(at), "2024-02-29T08:00:00.000000Z");
        assert_eq!(parse_optional_timestamp(None).unwrap(), None);
    }
}
