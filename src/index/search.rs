//! Searching an index by name, size and modification date

use super::bucketed::{BucketedIndex, FileEntry};
use crate::core::error::{IndexError, Result};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::{Regex, RegexBuilder};

/// Filters applied by [`search`]; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    /// Case-insensitive regular expression matched against the file name
    pub name_pattern: Option<String>,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
    /// Earliest modification time, seconds since the Unix epoch
    pub date_min: Option<i64>,
    /// Latest modification time, seconds since the Unix epoch
    pub date_max: Option<i64>,
}

impl SearchCriteria {
    fn compile_pattern(&self) -> Result<Option<Regex>> {
        self.name_pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| IndexError::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    })
            })
            .transpose()
    }

    fn size_matches(&self, size: u64) -> bool {
        self.size_min.map_or(true, |min| size >= min) && self.size_max.map_or(true, |max| size <= max)
    }

    fn date_matches(&self, mtime: i64) -> bool {
        self.date_min.map_or(true, |min| mtime >= min) && self.date_max.map_or(true, |max| mtime <= max)
    }
}

/// Entries matching every criterion, sorted by path
pub fn search<'a>(index: &'a BucketedIndex, criteria: &SearchCriteria) -> Result<Vec<&'a FileEntry>> {
    let regex = criteria.compile_pattern()?;

    let mut results: Vec<&FileEntry> = index
        .entries()
        .iter()
        .filter(|e| criteria.size_matches(e.size))
        .filter(|e| criteria.date_matches(e.mtime))
        .filter(|e| match &regex {
            Some(re) => e
                .file_name()
                .map(|n| re.is_match(&n.to_string_lossy()))
                .unwrap_or(false),
            None => true,
        })
        .collect();

    results.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(results)
}

/// Parse a size such as `500`, `5MB`, `2.5 gb` or `10K` into bytes
///
/// Units are binary (1 KB = 1024 bytes). `any` and the empty string mean no
/// bound.
pub fn parse_size(input: &str) -> std::result::Result<Option<u64>, String> {
    let text = input.trim().to_uppercase();
    if text.is_empty() || text == "ANY" {
        return Ok(None);
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("Invalid size format: {}", input))?;

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(format!("Invalid size format: {}", input)),
    };

    Ok(Some((number * multiplier as f64) as u64))
}

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%m/%d/%Y"];

/// Parse a local date or date-time into seconds since the Unix epoch
///
/// Accepts `today`, `yesterday`, ISO dates with optional time, and the
/// `dd.mm.yyyy`, `dd/mm/yyyy` and `mm/dd/yyyy` forms (tried in that order).
pub fn parse_date(input: &str) -> std::result::Result<Option<i64>, String> {
    let text = input.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("any") {
        return Ok(None);
    }

    let today = Local::now().date_naive();
    let naive = match text.to_lowercase().as_str() {
        "today" => midnight(today),
        "yesterday" => midnight(today - Duration::days(1)),
        _ => parse_naive(text).ok_or_else(|| format!("Invalid date format: {}", input))?,
    };

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| Some(dt.timestamp()))
        .ok_or_else(|| format!("Date does not exist in local time: {}", input))
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(midnight)
        })
}
