//! Projection to the output schema and per-user file writing.

use std::io::Write;
use std::path::{Path, PathBuf};

use clickstream_core::error::{PrepError, Result};
use clickstream_core::models::{NormalizedEvent, OutputBucket, ResolvedRecord};
use serde::Serialize;
use tracing::debug;

use crate::resolver::ResolvedEvent;

// ── Per-user result ───────────────────────────────────────────────────────────

/// Counters for one user's pass through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub raw_rows: usize,
    pub parsed_rows: usize,
    pub sessions: u32,
    pub kept: usize,
    pub resolved: usize,
}

/// The rows written for one user. Resolved users get output records; the
/// fallback buckets carry normalised events so the drop can be inspected.
#[derive(Debug, Clone)]
pub enum UserRows {
    Records(Vec<ResolvedRecord>),
    Events(Vec<NormalizedEvent>),
}

impl UserRows {
    pub fn len(&self) -> usize {
        match self {
            UserRows::Records(rows) => rows.len(),
            UserRows::Events(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the pipeline produced for one user.
#[derive(Debug, Clone)]
pub struct UserOutput {
    pub user_id: String,
    pub bucket: OutputBucket,
    pub rows: UserRows,
    pub stats: UserStats,
}

// ── RecordAssembler ───────────────────────────────────────────────────────────

pub struct RecordAssembler;

impl RecordAssembler {
    /// Project a resolved event onto the 14-field output schema.
    pub fn project(resolved: &ResolvedEvent) -> ResolvedRecord {
        let event = &resolved.event;
        let raw = &event.raw;
        ResolvedRecord {
            user_id: raw.user_id.clone(),
            module_id: Some(resolved.hex_id.clone()),
            order: Some(resolved.order),
            parent_module_id: resolved.parent_id.clone(),
            module_type: Some(resolved.module_type.clone()),
            event_type: Some(raw.event_type.clone()),
            time: Some(event.timestamp),
            period: Some(event.period),
            session: Some(raw.session.clone()),
            tsess: Some(event.tsess),
            attempts: raw.attempts,
            grade: raw.grade,
            max_grade: raw.max_grade,
            success: raw.success.clone(),
        }
    }

    pub fn project_all(resolved: &[ResolvedEvent]) -> Vec<ResolvedRecord> {
        resolved.iter().map(Self::project).collect()
    }
}

// ── OutputWriter ──────────────────────────────────────────────────────────────

/// Writes per-user JSON-lines files under an output root, one sub-directory
/// per fallback bucket.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output root and every bucket directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        for bucket in OutputBucket::ALL {
            let dir = self.dir_for(bucket);
            std::fs::create_dir_all(&dir).map_err(|source| PrepError::FileWrite {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn dir_for(&self, bucket: OutputBucket) -> PathBuf {
        match bucket.subdir() {
            Some(sub) => self.root.join(sub),
            None => self.root.clone(),
        }
    }

    /// Output file of `user_id` in `bucket`. Ids that are not usable verbatim
    /// as a file name are rejected so two users never share a file.
    pub fn path_for(&self, bucket: OutputBucket, user_id: &str) -> Result<PathBuf> {
        let stem = checked_file_stem(user_id)?;
        Ok(self.dir_for(bucket).join(format!("{}.jsonl", stem)))
    }

    /// Write one user's rows. Returns the final path.
    pub fn write(&self, output: &UserOutput) -> Result<PathBuf> {
        let path = self.path_for(output.bucket, &output.user_id)?;
        match &output.rows {
            UserRows::Records(rows) => write_jsonl_atomic(&path, rows)?,
            UserRows::Events(rows) => write_jsonl_atomic(&path, rows)?,
        }
        debug!(
            "Wrote {} rows for user {} to {}",
            output.rows.len(),
            output.user_id,
            path.display()
        );
        Ok(path)
    }
}

/// Accept `user_id` as a file stem only when it is non-empty, made of ASCII
/// alphanumerics, `-`, `_` and `.`, and not all dots.
pub fn checked_file_stem(user_id: &str) -> Result<&str> {
    let usable = !user_id.is_empty()
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !user_id.chars().all(|c| c == '.');
    if usable {
        Ok(user_id)
    } else {
        Err(PrepError::InvalidUserId(user_id.to_string()))
    }
}

/// Serialise `rows` one per line to a temp file beside `path`, then rename.
fn write_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let write_err = |source: std::io::Error| PrepError::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let tmp = path.with_extension("jsonl.tmp");
    {
        let file = std::fs::File::create(&tmp).map_err(write_err)?;
        let mut out = std::io::BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut out, row)?;
            out.write_all(b"\n").map_err(write_err)?;
        }
        out.flush().map_err(write_err)?;
    }
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
