//! Heuristic field extraction from raw OCR text.
//!
//! Every function here is pure: the same text always yields the same fields.
//! Missing Title, Description and Date values are reported as [`UNKNOWN`]
//! rather than omitted.

use chrono::NaiveDate;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placeholder for a field that could not be determined.
pub const UNKNOWN: &str = "UNKNOWN";

/// Description budget used by the heuristic extractor.
pub const DEFAULT_DESCRIPTION_CHARS: usize = 100;

// Alternatives are tried left to right at each position, so the ISO form
// must come before the bare year or "2022-12-31" would match as "2022".
// An ISO date may run straight into a time ("2022-12-31T10:00").
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(?P<dmy>\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\b
        | \b(?P<iso>\d{4}-\d{1,2}-\d{1,2})(?:\b|T\d)
        | \b(?P<named>(?i:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2},\s*\d{4})\b
        | \b(?P<year>\d{4})\b
        ",
    )
    .expect("date pattern is valid")
});

static VOLUME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bvol(?:ume)?\.?\s*(\d+)").expect("volume pattern is valid"));

static ISSUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:No\.?|NO\.?|[Ii]ssue|ISSUE)\s*#?\s*(\d+)").expect("issue pattern is valid")
});

/// What to put in the Title field when the text has no non-blank line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TitleFallback {
    /// Use the `UNKNOWN` sentinel.
    Sentinel,
    /// Use the source file stem.
    Filename,
}

/// How precisely a date match could be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    /// Day, month and year were all present.
    Full,
    /// Only a year was present; normalized to January 1st.
    YearOnly,
    /// A date-like substring was found but could not be canonicalized.
    Unparsed,
}

/// A date found in text along with how it was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    pub value: String,
    pub kind: DateKind,
}

/// Structured fields derived from text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedFields {
    pub title: String,
    pub description: String,
    pub date: String,
    pub date_kind: Option<DateKind>,
    pub volume: Option<String>,
    pub issue: Option<String>,
}

/// Extract every heuristic field from `text`.
pub fn extract_fields(
    text: &str,
    filename: &str,
    fallback: TitleFallback,
    description_chars: usize,
) -> ExtractedFields {
    let date = find_date(text);

    ExtractedFields {
        title: extract_title(text).unwrap_or_else(|| title_fallback(filename, fallback)),
        description: extract_description(text, description_chars),
        date: date.as_ref().map_or_else(|| UNKNOWN.to_string(), |d| d.value.clone()),
        date_kind: date.map(|d| d.kind),
        volume: extract_volume(text),
        issue: extract_issue(text),
    }
}

/// First non-blank line, trimmed.
pub fn extract_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

pub fn title_fallback(filename: &str, fallback: TitleFallback) -> String {
    match fallback {
        TitleFallback::Sentinel => UNKNOWN.to_string(),
        TitleFallback::Filename => {
            let stem = std::path::Path::new(filename)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(filename);
            if stem.trim().is_empty() {
                UNKNOWN.to_string()
            } else {
                stem.to_string()
            }
        }
    }
}

/// Line breaks collapsed to spaces, cut to `max_chars` characters, trimmed.
pub fn extract_description(text: &str, max_chars: usize) -> String {
    let flattened: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(max_chars)
        .collect();

    let trimmed = flattened.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalized `YYYY/MM/DD` date, the raw match when it cannot be
/// canonicalized, or `UNKNOWN` when nothing date-like is present.
pub fn extract_date(text: &str) -> String {
    find_date(text).map_or_else(|| UNKNOWN.to_string(), |d| d.value)
}

/// Locate the first date-like substring and interpret it.
pub fn find_date(text: &str) -> Option<DateMatch> {
    let caps = DATE_RE.captures(text)?;

    let parsed = if let Some(m) = caps.name("dmy") {
        parse_day_first(m.as_str()).map(|d| (d, DateKind::Full))
    } else if let Some(m) = caps.name("iso") {
        parse_iso(m.as_str()).map(|d| (d, DateKind::Full))
    } else if let Some(m) = caps.name("named") {
        parse_named(m.as_str()).map(|d| (d, DateKind::Full))
    } else if let Some(m) = caps.name("year") {
        m.as_str()
            .parse::<i32>()
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
            .map(|d| (d, DateKind::YearOnly))
    } else {
        None
    };

    let raw = caps
        .iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str())
        .unwrap_or_default();
    Some(match parsed {
        Some((date, kind)) => DateMatch {
            value: format_date(date),
            kind,
        },
        None => {
            debug!("Could not canonicalize date match '{}'", raw);
            DateMatch {
                value: raw.to_string(),
                kind: DateKind::Unparsed,
            }
        }
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

/// Day-first reading of `a/b/y`, with a month-first retry when the day-first
/// reading is not a valid calendar date.
fn parse_day_first(s: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(|c| c == '/' || c == '-').collect();
    if parts.len() != 3 {
        return None;
    }

    let a: u32 = parts[0].parse().ok()?;
    let b: u32 = parts[1].parse().ok()?;
    let year = expand_year(parts[2])?;

    NaiveDate::from_ymd_opt(year, b, a).or_else(|| NaiveDate::from_ymd_opt(year, a, b))
}

fn parse_iso(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_named(s: &str) -> Option<NaiveDate> {
    let (month_part, rest) = s.split_once(char::is_whitespace)?;
    let month = month_number(month_part.trim_end_matches('.'))?;

    let (day_part, year_part) = rest.split_once(',')?;
    let day: u32 = day_part.trim().parse().ok()?;
    let year: i32 = year_part.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Two-digit years pivot at 69 (00-68 -> 20xx, 69-99 -> 19xx).
fn expand_year(s: &str) -> Option<i32> {
    let value: i32 = s.parse().ok()?;
    match s.len() {
        2 if value < 69 => Some(2000 + value),
        2 => Some(1900 + value),
        4 => Some(value),
        _ => None,
    }
}

/// Number following `Vol`, `Vol.` or `Volume`.
pub fn extract_volume(text: &str) -> Option<String> {
    VOLUME_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Number following `No`, `No.` or `Issue`.
pub fn extract_issue(text: &str) -> Option<String> {
    ISSUE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_date_is_normalized() {
        assert_eq!(extract_date("Report 2022-12-31"), "2022/12/31");
    }

    #[test]
    fn iso_timestamp_keeps_day_and_month() {
        assert_eq!(extract_date("Report 2022-12-31T10:00"), "2022/12/31");
        assert_eq!(find_date("at 2022-12-31T10:00").map(|d| d.kind), Some(DateKind::Full));
    }

    #[test]
    fn bare_year_defaults_to_january_first() {
        assert_eq!(extract_date("Year 2022"), "2022/01/01");
        assert_eq!(find_date("Year 2022").map(|d| d.kind), Some(DateKind::YearOnly));
    }

    #[test]
    fn no_date_yields_sentinel() {
        assert_eq!(extract_date("no date"), UNKNOWN);
        assert_eq!(extract_date(""), UNKNOWN);
    }

    #[test]
    fn numeric_dates_are_day_first() {
        assert_eq!(extract_date("Document from 31/12/2022 is important"), "2022/12/31");
        assert_eq!(extract_date("Dated 05/04/2021"), "2021/04/05");
    }

    #[test]
    fn month_first_used_when_day_first_is_invalid() {
        assert_eq!(extract_date("Published on 12-31-2022"), "2022/12/31");
    }

    #[test]
    fn two_digit_years_pivot() {
        assert_eq!(extract_date("on 1/2/03"), "2003/02/01");
        assert_eq!(extract_date("on 1/2/75"), "1975/02/01");
    }

    #[test]
    fn named_month_dates() {
        assert_eq!(extract_date("Issued March 5, 1998 in Boston"), "1998/03/05");
        assert_eq!(extract_date("Sept. 14, 1961"), "1961/09/14");
    }

    #[test]
    fn unparseable_match_is_returned_verbatim() {
        let found = find_date("ref 45/45/2020 end").expect("match");
        assert_eq!(found.value, "45/45/2020");
        assert_eq!(found.kind, DateKind::Unparsed);

        assert_eq!(extract_date("code 1/2/202"), "1/2/202");
    }

    #[test]
    fn leftmost_date_wins() {
        assert_eq!(extract_date("1987 annual, revised 2001-06-30"), "1987/01/01");
    }

    #[test]
    fn extracted_dates_are_canonical_or_verbatim() {
        let samples = [
            "x 3-4-1999 y",
            "Feb 29, 2021",
            "2019-02-29",
            "ticket 12/13/14",
            "the 1900 census",
        ];
        for text in samples {
            let date = extract_date(text);
            let canonical = date.len() == 10
                && date.as_bytes()[4] == b'/'
                && date.as_bytes()[7] == b'/';
            assert!(canonical || text.contains(&date), "{} -> {}", text, date);
        }
    }

    #[test]
    fn title_is_first_non_blank_line() {
        let text = "\n   \n  The Gazette  \nsecond line";
        assert_eq!(extract_title(text).as_deref(), Some("The Gazette"));
        assert_eq!(extract_title("  \n\t\n"), None);
    }

    #[test]
    fn title_fallback_policies() {
        let sentinel = extract_fields("   ", "scan_001.pdf", TitleFallback::Sentinel, 100);
        assert_eq!(sentinel.title, UNKNOWN);

        let filename = extract_fields("", "scan_001.pdf", TitleFallback::Filename, 100);
        assert_eq!(filename.title, "scan_001");
    }

    #[test]
    fn description_collapses_lines_and_truncates() {
        let text = "Line one\nLine two\r\nLine three";
        assert_eq!(extract_description(text, 100), "Line one Line two  Line three");
        assert_eq!(extract_description(text, 8), "Line one");
        assert_eq!(extract_description("\n\n  ", 100), UNKNOWN);
    }

    #[test]
    fn description_counts_characters_not_bytes() {
        let text = "Café Müller résumé";
        assert_eq!(extract_description(text, 4), "Café");
    }

    #[test]
    fn volume_and_issue_first_match_wins() {
        let text = "Quarterly Review Vol. 12 No. 3\nVolume 13 Issue 4";
        assert_eq!(extract_volume(text).as_deref(), Some("12"));
        assert_eq!(extract_issue(text).as_deref(), Some("3"));

        assert_eq!(extract_volume("Volume 7, Issue 2").as_deref(), Some("7"));
        assert_eq!(extract_issue("Volume 7, Issue 2").as_deref(), Some("2"));
    }

    #[test]
    fn volume_and_issue_absent_without_numbers() {
        assert_eq!(extract_volume("No volume information"), None);
        assert_eq!(extract_issue("No date here"), None);
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "Harbor News\nVol 3 No 9\nPrinted 14/07/1989 by the press";
        let first = extract_fields(text, "a.pdf", TitleFallback::Sentinel, 100);
        let second = extract_fields(text, "a.pdf", TitleFallback::Sentinel, 100);
        assert_eq!(first, second);
        assert_eq!(first.title, "Harbor News");
        assert_eq!(first.date, "1989/07/14");
        assert_eq!(first.volume.as_deref(), Some("3"));
        assert_eq!(first.issue.as_deref(), Some("9"));
    }
}
