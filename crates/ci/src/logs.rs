//! Log archive extraction and search.

use std::io::{Cursor, Read};

use chrono::DateTime;
use serde::Serialize;

use crate::error::CiError;

/// Markers of a failing step in runner output.
pub const DEFAULT_ERROR_NEEDLES: &[&str] =
    &["##[error]", "Error", "Traceback", "FAILED", "Exception"];

/// One file from a run's log archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMatch {
    pub file: String,
    /// 1-based.
    pub line_number: usize,
    pub line: String,
}

/// Unpack a log archive into text files, sorted by name. Directories are
/// skipped and invalid UTF-8 is replaced.
pub fn extract_archive(bytes: &[u8]) -> Result<Vec<LogFile>, CiError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut files = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let mut raw = Vec::new();
        entry.read_to_end(&mut raw)?;
        files.push(LogFile {
            name: entry.name().to_string(),
            content: String::from_utf8_lossy(&raw).into_owned(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Drop the runner's leading RFC 3339 timestamp, if present.
pub fn strip_timestamp(line: &str) -> &str {
    match line.split_once(' ') {
        Some((first, rest)) if DateTime::parse_from_rfc3339(first).is_ok() => rest,
        _ => line,
    }
}

/// Lines containing any of `needles`, in file then line order.
pub fn search(files: &[LogFile], needles: &[&str]) -> Vec<LogMatch> {
    let mut matches = Vec::new();
    for file in files {
        for (idx, line) in file.content.lines().enumerate() {
            let text = strip_timestamp(line);
            if needles.iter().any(|n| text.contains(n)) {
                matches.push(LogMatch {
                    file: file.name.clone(),
                    line_number: idx + 1,
                    line: text.to_string(),
                });
            }
        }
    }
    matches
}

pub fn error_lines(files: &[LogFile]) -> Vec<LogMatch> {
    search(files, DEFAULT_ERROR_NEEDLES)
}

/// Last `n` lines of `text`.
pub fn tail(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.add_directory("render/", options).unwrap();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_files_sorted_without_directories() {
        let bytes = archive(&[("render/2_encode.txt", "b"), ("0_render.txt", "a")]);
        let files = extract_archive(&bytes).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["0_render.txt", "render/2_encode.txt"]);
    }

    #[test]
    fn garbage_is_an_archive_error() {
        assert!(matches!(extract_archive(b"not a zip"), Err(CiError::Archive(_))));
    }

    #[test]
    fn timestamps_are_stripped() {
        assert_eq!(
            strip_timestamp("2024-05-01T10:00:00.1234567Z ##[error]Process completed"),
            "##[error]Process completed"
        );
        assert_eq!(strip_timestamp("plain line here"), "plain line here");
    }

    #[test]
    fn error_lines_report_file_and_line() {
        let files = vec![LogFile {
            name: "0_render.txt".to_string(),
            content: "starting\n2024-05-01T10:00:01Z Traceback (most recent call last):\nok\n##[error]exit 1"
                .to_string(),
        }];
        let found = error_lines(&files);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].line_number, 2);
        assert_eq!(found[0].line, "Traceback (most recent call last):");
        assert_eq!(found[1].line_number, 4);
    }

    #[test]
    fn search_custom_needle() {
        let files = vec![LogFile {
            name: "x".to_string(),
            content: "job_1 queued\njob_2 queued\njob_1 done".to_string(),
        }];
        assert_eq!(search(&files, &["job_1"]).len(), 2);
    }

    #[test]
    fn tail_returns_last_lines() {
        assert_eq!(tail("a\nb\nc", 2), ["b", "c"]);
        assert_eq!(tail("a", 5), ["a"]);
        assert!(tail("", 3).is_empty());
    }
}
