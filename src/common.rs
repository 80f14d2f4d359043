//! Text helpers shared by the renderer and the sanitizer.

use core::fmt::{self, Write as _};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};
use time::{Date, Month, OffsetDateTime, format_description::well_known::Rfc3339};

/// Formats a date according to the given PHP `date()` style `format`
/// string.
///
/// A backslash escapes the next character, and text in double quotes is
/// copied as-is. Unknown format characters are copied as-is.
pub fn format_date(date: OffsetDateTime, format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    if let Err(err) = write_date(&mut out, date, format) {
        log::warn!("could not format date: {err}");
    }
    out
}

fn write_date(out: &mut String, date: OffsetDateTime, format: &str) -> fmt::Result {
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        match c {
            'Y' => write!(out, "{:04}", date.year())?,
            'y' => write!(out, "{:02}", date.year().rem_euclid(100))?,
            'm' => write!(out, "{:02}", u8::from(date.month()))?,
            'n' => write!(out, "{}", u8::from(date.month()))?,
            'F' => write!(out, "{}", date.month())?,
            'M' => out.write_str(abbreviate(&date.month().to_string()))?,
            'd' => write!(out, "{:02}", date.day())?,
            'j' => write!(out, "{}", date.day())?,
            'l' => write!(out, "{}", date.weekday())?,
            'D' => out.write_str(abbreviate(&date.weekday().to_string()))?,
            'N' => write!(out, "{}", date.weekday().number_from_monday())?,
            'w' => write!(out, "{}", date.weekday().number_days_from_sunday())?,
            'z' => write!(out, "{}", date.ordinal() - 1)?,
            'W' => write!(out, "{:02}", date.iso_week())?,
            'H' => write!(out, "{:02}", date.hour())?,
            'G' => write!(out, "{}", date.hour())?,
            'h' => write!(out, "{:02}", twelve_hour(date.hour()))?,
            'g' => write!(out, "{}", twelve_hour(date.hour()))?,
            'i' => write!(out, "{:02}", date.minute())?,
            's' => write!(out, "{:02}", date.second())?,
            'A' => out.write_str(if date.hour() < 12 { "AM" } else { "PM" })?,
            'a' => out.write_str(if date.hour() < 12 { "am" } else { "pm" })?,
            'U' => write!(out, "{}", date.unix_timestamp())?,
            'c' => match date.format(&Rfc3339) {
                Ok(text) => out.write_str(&text)?,
                Err(err) => log::warn!("could not format date: {err}"),
            },
            '\\' => {
                if let Some(c) = chars.next() {
                    out.push(c);
                }
            }
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    out.push(c);
                }
            }
            c => out.push(c),
        }
    }
    Ok(())
}

/// Parses a date argument. Accepts RFC 3339 timestamps, ISO dates, and bare
/// four-digit years. Dates without a time are midnight UTC.
pub fn parse_date(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(date) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(date);
    }

    let date = if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        Date::from_calendar_date(text.parse().ok()?, Month::January, 1).ok()?
    } else {
        Date::parse(text, time::macros::format_description!("[year]-[month]-[day]")).ok()?
    };
    Some(date.midnight().assume_utc())
}

/// Returns the first three characters of a month or weekday name.
fn abbreviate(name: &str) -> &str {
    &name[..name.len().min(3)]
}

/// Converts a 24-hour clock hour to a 12-hour clock hour.
fn twelve_hour(hour: u8) -> u8 {
    match hour % 12 {
        0 => 12,
        hour => hour,
    }
}

/// Removes anything that looks like an HTML tag.
pub fn strip_tags(html: &str) -> Cow<'_, str> {
    static RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
    RE.replace_all(html, "")
}

/// Bytes left alone when a page title goes into a URL path. Spaces are
/// already underscores by then.
const TITLE_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'@')
    .remove(b'$')
    .remove(b'!')
    .remove(b'*')
    .remove(b'(')
    .remove(b')')
    .remove(b',');

/// Percent-encodes a page title or slug for use in a URL path.
pub fn url_encode(input: &str) -> percent_encoding::PercentEncode<'_> {
    percent_encoding::utf8_percent_encode(input, TITLE_UNRESERVED)
}

/// Encodes a value for use in a query string. Spaces become `+`.
pub fn query_encode(input: &str) -> String {
    url::form_urlencoded::byte_serialize(input.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_date() {
        let date = time::macros::datetime!(2024-03-09 14:05:07 UTC);
        assert_eq!(format_date(date, "Y-m-d H:i:s"), "2024-03-09 14:05:07");
        assert_eq!(format_date(date, "j F Y"), "9 March 2024");
        assert_eq!(format_date(date, "D, M j"), "Sat, Mar 9");
        assert_eq!(format_date(date, "l N w z"), "Saturday 6 6 68");
        assert_eq!(format_date(date, "g:i a"), "2:05 pm");
        assert_eq!(format_date(date, "YmdHis"), "20240309140507");
        assert_eq!(format_date(date, r#"\Y "at" H"#), "Y at 14", "escapes");
        assert_eq!(format_date(date, "W"), "10");
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("2001-02-03").unwrap();
        assert_eq!(format_date(date, "Y-m-d H:i"), "2001-02-03 00:00");
        let date = parse_date("1999").unwrap();
        assert_eq!(format_date(date, "Y-m-d"), "1999-01-01");
        let date = parse_date("2010-05-06T07:08:09Z").unwrap();
        assert_eq!(format_date(date, "H:i:s"), "07:08:09");
        assert!(parse_date("next tuesday").is_none());
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>bold</b> and <a href=\"x\">link</a>"), "bold and link");
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(
            url_encode("Help_talk:History/Al-Andalus").to_string(),
            "Help_talk:History/Al-Andalus",
            "title punctuation is kept"
        );
        assert_eq!(
            url_encode("C\u{f3}rdoba?x=1#top").to_string(),
            "C%C3%B3rdoba%3Fx%3D1%23top"
        );
        assert_eq!(url_encode("a\"b<c>&d").to_string(), "a%22b%3Cc%3E%26d");
    }

    #[test]
    fn test_query_encode() {
        assert_eq!(query_encode("a b&c/d-e"), "a+b%26c%2Fd-e");
        assert_eq!(query_encode("Al-Andalus_1.0~"), "Al-Andalus_1.0%7E");
        assert_eq!(query_encode("C\u{f3}rdoba"), "C%C3%B3rdoba");
    }
}
