//! Input loading: per-user raw event files, user id lists, and the shared
//! course-structure table.
//!
//! All inputs are JSON-lines files. Malformed lines are skipped with a debug
//! log so that one bad row never costs a user their whole log.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use clickstream_core::error::{PrepError, Result};
use clickstream_core::models::RawEvent;
use clickstream_core::structure::{CourseStructure, CourseStructureNode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Find the `.jsonl` files directly inside `data_path`, sorted by path.
///
/// Subdirectories are not entered, so an output tree placed under the input
/// directory is never mistaken for user logs.
pub fn find_jsonl_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "jsonl")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Path of the raw event file for `user_id` under `input_dir`.
pub fn user_events_path(input_dir: &Path, user_id: &str) -> PathBuf {
    input_dir.join(format!("{}.jsonl", user_id))
}

/// Load one user's raw events.
///
/// A missing file is not an error: the user simply has zero events and is
/// routed accordingly downstream.
pub fn load_user_events(path: &Path) -> Result<Vec<RawEvent>> {
    if !path.exists() {
        warn!("No event file for user at {}", path.display());
        return Ok(Vec::new());
    }
    let (events, skipped) = read_jsonl::<RawEvent>(path)?;
    debug!(
        "File {}: {} events loaded, {} malformed lines skipped",
        path.display(),
        events.len(),
        skipped
    );
    Ok(events)
}

/// Read user ids from a list file: one id per line, blank lines and
/// duplicates ignored, first occurrence order preserved.
pub fn load_user_ids(path: &Path) -> Result<Vec<String>> {
    let file = open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut seen: HashSet<String> = HashSet::new();
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|source| PrepError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let id = line.trim();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Every user with an event file under `input_dir`, in path order.
pub fn discover_user_ids(input_dir: &Path) -> Vec<String> {
    find_jsonl_files(input_dir)
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect()
}

/// Load and index the course-structure table.
pub fn load_course_structure(path: &Path) -> Result<CourseStructure> {
    let (nodes, skipped) = read_jsonl::<CourseStructureNode>(path)?;
    if skipped > 0 {
        warn!(
            "Skipped {} malformed course-structure lines in {}",
            skipped,
            path.display()
        );
    }
    if nodes.is_empty() {
        return Err(PrepError::Structure(format!(
            "no nodes found in {}",
            path.display()
        )));
    }

    let structure = CourseStructure::from_nodes(nodes);
    let leaves = structure.nodes().iter().filter(|n| n.has_order()).count();
    info!(
        "Loaded course structure: {} nodes, {} ordered leaves",
        structure.len(),
        leaves
    );
    Ok(structure)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|source| PrepError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every non-blank line of `path` as `T`. Returns the parsed values and
/// the number of lines that failed to parse.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize)> {
    let file = open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut values = Vec::new();
    let mut skipped = 0usize;
    for (line_no, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|source| PrepError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(v) => values.push(v),
            Err(e) => {
                debug!(
                    "Failed to parse line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                );
                skipped += 1;
            }
        }
    }
    Ok((values, skipped))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    fn event_line(ts: &str, event_type: &str) -> String {
        serde_json::json!({
            "user_id": 42,
            "course_id": "course-v1:MITx+6.00x+2T2017",
            "event_type": event_type,
            "event": "{}",
            "time": ts,
        })
        .to_string()
    }

    // ── find_jsonl_files / discover_user_ids ──────────────────────────────────

    #[test]
    fn test_find_jsonl_files_sorted() {
        let dir = TempDir::new().unwrap();
        write_lines(dir.path(), "c.jsonl", &["x"]);
        write_lines(dir.path(), "a.jsonl", &["x"]);
        write_lines(dir.path(), "b.txt", &["x"]);

        let files = find_jsonl_files(dir.path());
        let names: Vec<&str> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "c.jsonl"]);
    }

    #[test]
    fn test_find_jsonl_files_nonexistent_path() {
        let files = find_jsonl_files(Path::new("/tmp/does-not-exist-clickstream-xyz"));
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_user_ids_from_file_stems() {
        let dir = TempDir::new().unwrap();
        write_lines(dir.path(), "1002.jsonl", &[]);
        write_lines(dir.path(), "1001.jsonl", &[]);

        assert_eq!(discover_user_ids(dir.path()), vec!["1001", "1002"]);
    }

    #[test]
    fn test_discover_ignores_nested_output() {
        let dir = TempDir::new().unwrap();
        write_lines(dir.path(), "1001.jsonl", &[]);
        let nested = dir.path().join("out").join("zero_events");
        std::fs::create_dir_all(&nested).unwrap();
        write_lines(&nested, "1002.jsonl", &[]);
        write_lines(&dir.path().join("out"), "1003.jsonl", &[]);

        assert_eq!(discover_user_ids(dir.path()), vec!["1001"]);
    }

    // ── load_user_events ──────────────────────────────────────────────────────

    #[test]
    fn test_load_user_events_skips_malformed_and_blank() {
        let dir = TempDir::new().unwrap();
        let good = event_line("2017-06-01T12:00:00+00:00", "play_video");
        let path = write_lines(dir.path(), "42.jsonl", &["{broken", &good, ""]);

        let events = load_user_events(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, "42");
        assert_eq!(events[0].event_type, "play_video");
    }

    #[test]
    fn test_load_user_events_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let events = load_user_events(&user_events_path(dir.path(), "nobody")).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_user_events_path() {
        assert_eq!(
            user_events_path(Path::new("/in"), "77"),
            PathBuf::from("/in/77.jsonl")
        );
    }

    // ── load_user_ids ─────────────────────────────────────────────────────────

    #[test]
    fn test_load_user_ids_dedupes_and_trims() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(dir.path(), "users.txt", &["  7 ", "", "3", "7"]);
        assert_eq!(load_user_ids(&path).unwrap(), vec!["7", "3"]);
    }

    #[test]
    fn test_load_user_ids_missing_file_is_error() {
        let err = load_user_ids(Path::new("/tmp/does-not-exist-users.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }

    // ── load_course_structure ─────────────────────────────────────────────────

    #[test]
    fn test_load_course_structure() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(
            dir.path(),
            "structure.jsonl",
            &[
                r#"{"id": "block-v1:X+Y+Z+type@sequential+block@s1", "parent_key": "c1/1", "depth": 3, "module_type": "sequential"}"#,
                r#"{"id": "block-v1:X+Y+Z+type@html+block@h1", "parent_key": "v1/1", "depth": 5, "order": 1, "module_type": "html"}"#,
                "not json",
            ],
        );

        let structure = load_course_structure(&path).unwrap();
        assert_eq!(structure.len(), 2);
        assert_eq!(structure.by_hex("h1").unwrap().order, Some(1));
        assert!(structure.child("c1", "1").is_some());
    }

    #[test]
    fn test_load_course_structure_empty_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(dir.path(), "structure.jsonl", &[""]);
        let err = load_course_structure(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid course structure"));
    }
}
