//! Parser for Unix-style `dir` output as produced by common FTP servers.
//!
//! Kept free of any FTP client type so it can be exercised with literal
//! text fixtures. Other server dialects (DOS, MLSD) are a known
//! limitation and are not handled here.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Sentinel emitted when a modification date cannot be parsed.
pub const UNKNOWN_MODIFIED: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: String,
}

/// Parses one listing line per entry. Lines with fewer than 9
/// whitespace-separated fields are skipped silently; `now` anchors
/// year-less timestamps to the current year.
pub fn parse_listing(lines: &[String], base_path: &str, now: NaiveDateTime) -> Vec<DirEntry> {
    lines
        .iter()
        .filter_map(|line| parse_line(line, base_path, now))
        .collect()
}

fn parse_line(line: &str, base_path: &str, now: NaiveDateTime) -> Option<DirEntry> {
    let (fields, name) = split_fields(line)?;

    let permissions = fields[0];
    let is_directory = permissions.starts_with('d');

    // Servers occasionally put non-numeric junk in the size column;
    // treat that as zero rather than dropping the entry.
    let size = fields[4].parse::<u64>().unwrap_or(0);

    let modified = parse_modified(fields[5], fields[6], fields[7], now)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| UNKNOWN_MODIFIED.to_string());

    let path = if base_path.ends_with('/') {
        format!("{base_path}{name}")
    } else {
        format!("{base_path}/{name}")
    };

    Some(DirEntry {
        name: name.to_string(),
        path,
        is_directory,
        size,
        modified,
    })
}

/// Splits off the first 8 whitespace-separated fields; the remainder is
/// the entry name, which may itself contain spaces. Returns `None` when
/// the line has fewer than 9 fields.
fn split_fields(line: &str) -> Option<([&str; 8], &str)> {
    let mut rest = line;
    let mut fields = [""; 8];
    for slot in fields.iter_mut() {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        *slot = &rest[..end];
        rest = &rest[end..];
    }
    let name = rest.trim_start();
    if name.is_empty() {
        return None;
    }
    Some((fields, name))
}

fn parse_modified(month: &str, day: &str, time_or_year: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if time_or_year.contains(':') {
        // "Oct 14 13:45" -- the server omits the year for recent files.
        let with_year = format!("{month} {day} {time_or_year} {}", now.year());
        NaiveDateTime::parse_from_str(&with_year, "%b %d %H:%M %Y").ok()
    } else {
        // "Oct 14 2022"
        let date = NaiveDate::parse_from_str(&format!("{month} {day} {time_or_year}"), "%b %d %Y").ok()?;
        date.and_hms_opt(0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn parses_regular_file() {
        let lines = vec!["-rw-r--r-- 1 user user 1024 Oct 14 13:45 file.txt".to_string()];
        let entries = parse_listing(&lines, "/home/kiosk/MediaPionowe", at(2025, 11, 1));
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.name, "file.txt");
        assert_eq!(e.path, "/home/kiosk/MediaPionowe/file.txt");
        assert!(!e.is_directory);
        assert_eq!(e.size, 1024);
        assert_eq!(e.modified, "2025-10-14 13:45:00");
    }

    #[test]
    fn parses_directory_with_explicit_year() {
        let lines = vec!["drwxr-xr-x 2 kiosk kiosk 4096 Oct 14 2022 media".to_string()];
        let entries = parse_listing(&lines, "/home/kiosk", at(2025, 11, 1));
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].modified, "2022-10-14 00:00:00");
    }

    #[test]
    fn name_with_spaces_is_kept_whole() {
        let lines = vec!["-rw-r--r-- 1 kiosk kiosk 99 Jan 2 08:05 spot reklamowy v2.mp4".to_string()];
        let entries = parse_listing(&lines, "/media/", at(2025, 3, 1));
        assert_eq!(entries[0].name, "spot reklamowy v2.mp4");
        assert_eq!(entries[0].path, "/media/spot reklamowy v2.mp4");
    }

    #[test]
    fn short_line_is_skipped_not_an_error() {
        let lines = vec![
            "total 12".to_string(),
            "-rw-r--r-- 1 user user 10 Oct".to_string(),
            "-rw-r--r-- 1 user user 10 Oct 14 13:45 ok.txt".to_string(),
        ];
        let entries = parse_listing(&lines, "/", at(2025, 1, 1));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "ok.txt");
    }

    #[test]
    fn unparseable_size_becomes_zero() {
        let lines = vec!["-rw-r--r-- 1 user user big Oct 14 13:45 odd.bin".to_string()];
        let entries = parse_listing(&lines, "/", at(2025, 1, 1));
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn bad_date_yields_unknown_sentinel() {
        let lines = vec!["-rw-r--r-- 1 user user 5 Xxx 99 13:45 weird.txt".to_string()];
        let entries = parse_listing(&lines, "/", at(2025, 1, 1));
        assert_eq!(entries[0].modified, UNKNOWN_MODIFIED);
    }
}
