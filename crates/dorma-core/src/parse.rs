//! Entry extractor for the "Aktuelle Buchungen" bookings page.
//!
//! The portal renders bookings as an HTML table; this module scans the
//! raw page with a fixed row pattern instead of a full HTML parser.
//! That couples it to the exact markup, which is deliberate: the
//! markup has been stable for years and the regex keeps the extraction
//! to a single pass with no DOM in between.

use anyhow::Result;
use chrono::{Local, TimeZone};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::DormaError;
use crate::models::{Entry, EntryType};

/// One bookings row: three `td-tabelle` cells holding an optional
/// dotted date (day.month.year, cells row-span so any part may be
/// empty), an hour:minute pair, and a free-text label.
static ROW_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<td class="td-tabelle">\s*(&nbsp;)?(\d*)\.?(\d*)\.?(\d*)\s*</td>\s*<td class="td-tabelle">\s*(\d+):(\d+)\s*</td>\s*<td class="td-tabelle">\s*([^<]+?)\s*</td>"#,
    )
    .expect("row pattern is valid")
});

/// Full match plus seven capture groups.
const ROW_GROUPS: usize = 8;

/// Extract all attendance entries from a raw bookings page.
///
/// Rows are matched non-overlapping in document order and the result
/// preserves that order. The table omits the date on rows that repeat
/// the previous one, so the last complete date is carried forward; a
/// dateless row before any complete date fails the whole parse. An
/// unrecognized label also fails the whole parse - there are no
/// partial results. A page without any matching rows yields an empty
/// list.
pub fn parse_entries(raw_html: &str) -> Result<Vec<Entry>> {
    // (year, month, day) carried forward for rows without a date
    let mut last_date: Option<(i32, u32, u32)> = None;

    let mut entries = Vec::new();
    for caps in ROW_PATTERN.captures_iter(raw_html) {
        if caps.len() != ROW_GROUPS {
            continue;
        }

        // Only a complete day.month.year triple updates the carried
        // date; a partial one leaves it untouched.
        let (day, month, year) = (group(&caps, 2), group(&caps, 3), group(&caps, 4));
        if !day.is_empty() && !month.is_empty() && !year.is_empty() {
            last_date = Some((number(year) as i32, number(month), number(day)));
        }

        let Some((year, month, day)) = last_date else {
            return Err(DormaError::MalformedDocument(
                "missing date for first entry".to_string(),
            )
            .into());
        };

        let hour = number(group(&caps, 5));
        let minute = number(group(&caps, 6));
        let time = Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .earliest()
            .ok_or_else(|| {
                DormaError::MalformedDocument(format!(
                    "invalid booking time {:02}.{:02}.{:04} {:02}:{:02}",
                    day, month, year, hour, minute
                ))
            })?;

        let label = group(&caps, 7);
        let entry_type = classify_label(label)?;

        entries.push(Entry { time, entry_type });
    }

    Ok(entries)
}

/// Map a row label to an entry type. Matching is case-insensitive and
/// substring-based on the portal's German labels.
fn classify_label(label: &str) -> Result<EntryType> {
    let lowered = label.to_lowercase();
    if lowered.contains("kommen") {
        Ok(EntryType::Come)
    } else if lowered.contains("gehen") {
        Ok(EntryType::Leave)
    } else {
        Err(DormaError::MalformedDocument(format!(
            "cannot parse entry type from {:?}",
            label
        ))
        .into())
    }
}

fn group<'a>(caps: &'a Captures<'_>, index: usize) -> &'a str {
    caps.get(index).map_or("", |m| m.as_str())
}

/// Digit-only capture to number; the pattern guarantees digits.
fn number(s: &str) -> u32 {
    s.parse().unwrap_or(0)
}
