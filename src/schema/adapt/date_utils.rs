//! Module for handling date parsing.

use crate::schema::adapt::types::DateFormatConfig;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Parse a date string with multiple format attempts
///
/// Date-time strings are accepted and truncated to their date. Two-digit years
/// follow chrono's `%y` pivot (00-68 map to 20xx, 69-99 to 19xx), which is why
/// client ages can come out negative and need correcting downstream.
#[must_use]
pub fn parse_date_string(s: &str, config: &DateFormatConfig) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for format in &config.date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    for format in &config.datetime_formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(s, format) {
            return Some(datetime.date());
        }
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Some(datetime.date_naive());
    }

    // If enabled, try to detect the format based on string patterns
    if config.enable_format_detection {
        if let Some((prefix, detected_format)) = detect_date_format(s) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, detected_format) {
                return Some(date);
            }
        }
    }

    None
}

/// Try to detect the date format based on string patterns
///
/// Returns the slice of `s` that carries the date together with the format to
/// parse it with. Only unambiguous shapes are recognised.
#[must_use]
pub fn detect_date_format(s: &str) -> Option<(&str, &'static str)> {
    // ISO date followed by anything (time, zone, fractional seconds)
    if s.len() > 10 && s.is_char_boundary(10) {
        let prefix = &s[..10];
        if prefix.as_bytes()[4] == b'-' && prefix.as_bytes()[7] == b'-' {
            return Some((prefix, "%Y-%m-%d"));
        }
    }

    // Check for compact format (YYYYMMDD)
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        return Some((s, "%Y%m%d"));
    }

    None
}
