//! Text helpers for titles, durations and filenames.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// Date patterns found in video titles, tried in order.
///
/// Dotted dates are read month-first, then day-first when month-first is
/// not a valid date (`25.12.2023`).
static TITLE_DATE_PATTERNS: LazyLock<Vec<(Regex, Vec<&'static str>)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(\d{1,2}\.\d{1,2}\.\d{4})").unwrap(),
            vec!["%m.%d.%Y", "%d.%m.%Y"],
        ),
        (
            Regex::new(r"(\d{1,2}\.\d{1,2}\.\d{2})(?:\D|$)").unwrap(),
            vec!["%m.%d.%y"],
        ),
        (
            Regex::new(r"(\d{4}/\d{1,2}/\d{1,2})").unwrap(),
            vec!["%Y/%m/%d"],
        ),
        (
            Regex::new(r"(\d{1,2}/\d{1,2}/\d{2})(?:\D|$)").unwrap(),
            vec!["%m/%d/%y"],
        ),
        (
            Regex::new(r"(\d{4}-\d{1,2}-\d{1,2})").unwrap(),
            vec!["%Y-%m-%d"],
        ),
    ]
});

static ISO_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^P(?:(\d+)D)?T?(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap());

/// Find the first date embedded in a title.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    TITLE_DATE_PATTERNS.iter().find_map(|(pattern, formats)| {
        let captures = pattern.captures(text)?;
        formats
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(&captures[1], format).ok())
    })
}

/// Convert an ISO-8601 duration (`PT1H2M3S`) to `"1H 2M 3S"`.
///
/// Missing components are written as zero; day components fold into hours.
/// Anything that is not an ISO duration is returned unchanged.
pub fn format_duration(duration: &str) -> String {
    let Some(captures) = ISO_DURATION.captures(duration) else {
        return duration.to_string();
    };
    if duration == "P" || duration == "PT" {
        return duration.to_string();
    }

    let part = |i: usize| -> u64 {
        captures
            .get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let hours = part(1) * 24 + part(2);
    format!("{}H {}M {}S", hours, part(3), part(4))
}

/// Make a string safe to use as a filename component.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(100)
        .collect::<String>()
        .trim()
        .to_string()
}
