//! Per-user preparation pipeline.
//!
//! Runs one user's raw rows through normalisation, segmentation,
//! classification and resolution, and decides which output bucket the
//! result belongs to. Holds no state across users.

use std::path::Path;

use clickstream_core::config::PipelineConfig;
use clickstream_core::error::Result;
use clickstream_core::models::{OutputBucket, RawEvent, ResolvedRecord};
use clickstream_core::structure::CourseStructure;
use tracing::info;

use crate::assembler::{checked_file_stem, RecordAssembler, UserOutput, UserRows, UserStats};
use crate::classifier::EventClassifier;
use crate::normalizer::TemporalNormalizer;
use crate::reader::{load_user_events, user_events_path};
use crate::resolver::ModuleResolver;
use crate::segmenter::SessionSegmenter;

/// Run the full pipeline for one user's rows.
///
/// 1. Parse, sort and measure periods. Nothing left → zero events.
/// 2. Assign temporal sessions and backfill session tokens.
/// 3. Classify. Nothing kept → no usable events, with every row as it stood.
/// 4. Resolve kept events. Nothing resolved → no resolved events.
/// 5. Project the resolved events onto the output schema.
pub fn process_user(
    user_id: &str,
    raw: Vec<RawEvent>,
    structure: &CourseStructure,
    config: &PipelineConfig,
) -> UserOutput {
    let mut stats = UserStats {
        raw_rows: raw.len(),
        ..Default::default()
    };

    // ── Step 1: Normalise ─────────────────────────────────────────────────────
    let mut events = TemporalNormalizer::new(config.final_period).normalize(raw);
    stats.parsed_rows = events.len();
    if events.is_empty() {
        info!("User {}: no events", user_id);
        return UserOutput {
            user_id: user_id.to_string(),
            bucket: OutputBucket::ZeroEvents,
            rows: UserRows::Records(vec![ResolvedRecord::placeholder(user_id)]),
            stats,
        };
    }

    // ── Step 2: Segment ───────────────────────────────────────────────────────
    stats.sessions = SessionSegmenter::new(config.session_threshold_minutes).segment(&mut events);

    // ── Step 3: Classify ──────────────────────────────────────────────────────
    stats.kept = EventClassifier::new(config.switches).classify(&mut events);
    if stats.kept == 0 {
        info!(
            "User {}: all {} events dropped by classification",
            user_id, stats.parsed_rows
        );
        return UserOutput {
            user_id: user_id.to_string(),
            bucket: OutputBucket::NoUsableEvents,
            rows: UserRows::Events(events),
            stats,
        };
    }
    let kept: Vec<_> = events.into_iter().filter(|e| e.keep).collect();

    // ── Step 4: Resolve ───────────────────────────────────────────────────────
    let outcome = ModuleResolver::new(structure).resolve(kept);
    stats.resolved = outcome.resolved.len();
    if outcome.resolved.is_empty() {
        info!(
            "User {}: none of {} kept events resolved to a module",
            user_id, stats.kept
        );
        return UserOutput {
            user_id: user_id.to_string(),
            bucket: OutputBucket::NoResolvedEvents,
            rows: UserRows::Events(outcome.unresolved),
            stats,
        };
    }

    // ── Step 5: Assemble ──────────────────────────────────────────────────────
    let records = RecordAssembler::project_all(&outcome.resolved);
    info!(
        "User {}: {} rows, {} sessions, {} kept, {} resolved",
        user_id, stats.raw_rows, stats.sessions, stats.kept, stats.resolved
    );
    UserOutput {
        user_id: user_id.to_string(),
        bucket: OutputBucket::Resolved,
        rows: UserRows::Records(records),
        stats,
    }
}

/// Load `{input_dir}/{user_id}.jsonl` and run [`process_user`] on it.
///
/// Ids that are not usable as a file name are refused before the input
/// directory is touched.
pub fn process_user_file(
    input_dir: &Path,
    user_id: &str,
    structure: &CourseStructure,
    config: &PipelineConfig,
) -> Result<UserOutput> {
    let stem = checked_file_stem(user_id)?;
    let raw = load_user_events(&user_events_path(input_dir, stem))?;
    Ok(process_user(user_id, raw, structure, config))
}
