// News entry extraction and publication date normalization

use crate::datasource::{Row, Value};
use crate::sitemap::NewsMetadata;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a row field could not be used as text.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIssue {
    #[error("field is missing or empty")]
    Missing,

    #[error("field is not text")]
    WrongType,
}

/// Read `name` from `row` as non-empty text.
///
/// Null and blank values count as missing. Numbers are rejected rather than
/// stringified, so a mis-mapped column is visible in the logs.
pub fn text_field<'a>(row: &'a Row, name: &str) -> Result<&'a str, FieldIssue> {
    match row.get(name) {
        None | Some(Value::Null) => Err(FieldIssue::Missing),
        Some(Value::Text(s)) if s.trim().is_empty() => Err(FieldIssue::Missing),
        Some(Value::Text(s)) => Ok(s),
        Some(Value::Integer(_)) | Some(Value::Real(_)) => Err(FieldIssue::WrongType),
    }
}

/// Build the news block for one row.
///
/// Only the title is mandatory. A missing language falls back to
/// `default_language`; an unparseable date falls back to today.
pub fn news_metadata(
    row: &Row,
    publication_name: &str,
    default_language: &str,
) -> Result<NewsMetadata, FieldIssue> {
    let title = text_field(row, "title")?;

    let language = match text_field(row, "language") {
        Ok(language) => language,
        Err(issue) => {
            debug!(issue = %issue, default_language, "Using default news language");
            default_language
        }
    };

    let raw_date = row.get("publication_date").map(Value::to_string).unwrap_or_default();

    Ok(NewsMetadata {
        publication_name: publication_name.to_string(),
        language: language.to_string(),
        publication_date: format_news_date(&raw_date),
        title: title.to_string(),
    })
}

/// Normalize a publication date to `YYYY-MM-DD`, falling back to the current UTC date.
pub fn format_news_date(raw: &str) -> String {
    match parse_news_date(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => {
            warn!(value = raw, "Failed to parse news publication date, using current date");
            Utc::now().format("%Y-%m-%d").to_string()
        }
    }
}

/// Try each accepted layout in order; the first match wins.
pub fn parse_news_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Some(dt.date());
    }
    // "2024-03-05 10:00:00.123456 +0000 UTC", with or without fractional seconds
    if let Some(without_zone) = strip_zone_name(raw)
        && let Ok(dt) = DateTime::parse_from_str(without_zone, "%Y-%m-%d %H:%M:%S%.f %z")
    {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }

    None
}

fn strip_zone_name(raw: &str) -> Option<&str> {
    let (head, zone) = raw.rsplit_once(' ')?;
    if !zone.is_empty() && zone.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(head)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(format_news_date("2024-03-05T10:00:00Z"), "2024-03-05");
        assert_eq!(format_news_date("2024-03-05T23:30:00-05:00"), "2024-03-05");
    }

    #[test]
    fn test_date_only_and_minutes() {
        assert_eq!(format_news_date("2024-03-05"), "2024-03-05");
        assert_eq!(format_news_date("2024-03-05T10:15"), "2024-03-05");
    }

    #[test]
    fn test_verbose_zone_layouts() {
        assert_eq!(
            format_news_date("2024-03-05 10:00:00.123456789 +0000 UTC"),
            "2024-03-05"
        );
        assert_eq!(
            format_news_date("2024-03-05 10:00:00.123456 +0100 CET"),
            "2024-03-05"
        );
        assert_eq!(format_news_date("2024-03-05 10:00:00 +0000 UTC"), "2024-03-05");
    }

    #[test]
    fn test_plain_sql_timestamp() {
        assert_eq!(format_news_date("2024-03-05 10:00:00"), "2024-03-05");
    }

    #[test]
    fn test_unparseable_falls_back_to_today() {
        let before = today();
        let formatted = format_news_date("not-a-date");
        let after = today();
        assert!(!formatted.is_empty());
        assert!(formatted == before || formatted == after);
        assert!(parse_news_date("").is_none());
    }

    #[test]
    fn test_text_field_issues() {
        let row = Row::new()
            .with("title", "Headline")
            .with("blank", "  ")
            .with("count", 3i64)
            .with("nothing", Value::Null);

        assert_eq!(text_field(&row, "title"), Ok("Headline"));
        assert_eq!(text_field(&row, "blank"), Err(FieldIssue::Missing));
        assert_eq!(text_field(&row, "nothing"), Err(FieldIssue::Missing));
        assert_eq!(text_field(&row, "absent"), Err(FieldIssue::Missing));
        assert_eq!(text_field(&row, "count"), Err(FieldIssue::WrongType));
    }

    #[test]
    fn test_news_metadata_defaults_language() {
        let row = Row::new()
            .with("title", "Headline")
            .with("publication_date", "2024-03-05");

        let news = news_metadata(&row, "Daily", "en").unwrap();
        assert_eq!(news.language, "en");
        assert_eq!(news.publication_name, "Daily");
        assert_eq!(news.publication_date, "2024-03-05");
        assert_eq!(news.title, "Headline");
    }

    #[test]
    fn test_news_metadata_requires_title() {
        let row = Row::new().with("title", 12i64).with("language", "fr");
        assert_eq!(news_metadata(&row, "Daily", "en"), Err(FieldIssue::WrongType));

        let row = Row::new().with("language", "fr");
        assert_eq!(news_metadata(&row, "Daily", "en"), Err(FieldIssue::Missing));
    }
}
