//! Batch orchestrator.
//!
//! Runs the per-user pipeline for every requested user on a bounded pool of
//! tokio tasks. Each user runs on a blocking thread under a time budget; a
//! user whose pipeline fails, panics or times out is recorded as a failure
//! and the batch moves on. Output is written only for users that finished
//! inside their budget.
//!
//! A worker slot is a semaphore permit owned by the blocking thread, so a
//! timed-out pipeline keeps its slot until it actually returns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clickstream_core::config::PipelineConfig;
use clickstream_core::error::{PrepError, Result};
use clickstream_core::models::OutputBucket;
use clickstream_core::structure::CourseStructure;
use clickstream_data::assembler::{OutputWriter, UserOutput};
use clickstream_data::pipeline::process_user_file;
use clickstream_data::reader::{discover_user_ids, load_user_ids};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default per-user time budget.
pub const DEFAULT_USER_TIMEOUT: Duration = Duration::from_secs(120);

// ── UserProcessor ─────────────────────────────────────────────────────────────

/// Produces one user's output. Called on a blocking thread.
pub trait UserProcessor: Send + Sync + 'static {
    fn process(&self, user_id: &str) -> Result<UserOutput>;
}

/// Reads `{input_dir}/{user_id}.jsonl` and runs the preparation pipeline
/// against a shared course structure.
pub struct FilePipeline {
    input_dir: PathBuf,
    structure: Arc<CourseStructure>,
    config: PipelineConfig,
}

impl FilePipeline {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        structure: Arc<CourseStructure>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            structure,
            config,
        }
    }
}

impl UserProcessor for FilePipeline {
    fn process(&self, user_id: &str) -> Result<UserOutput> {
        process_user_file(&self.input_dir, user_id, &self.structure, &self.config)
    }
}

// ── RunSummary ────────────────────────────────────────────────────────────────

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// User ids per output bucket, in completion order.
    pub buckets: HashMap<OutputBucket, Vec<String>>,
    /// Users that produced no output, with the reason.
    pub failed: Vec<(String, String)>,
    /// Output rows written across all users.
    pub rows_written: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record_success(&mut self, output: &UserOutput) {
        self.rows_written += output.rows.len();
        self.buckets
            .entry(output.bucket)
            .or_default()
            .push(output.user_id.clone());
    }

    fn record_failure(&mut self, user_id: String, error: &PrepError) {
        warn!("User {} failed: {}", user_id, error);
        self.failed.push((user_id, error.to_string()));
    }

    pub fn users(&self, bucket: OutputBucket) -> &[String] {
        self.buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, bucket: OutputBucket) -> usize {
        self.users(bucket).len()
    }

    pub fn completed(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Emit the end-of-run summary.
    pub fn log(&self) {
        info!(
            "Run finished in {:.1}s: {} users completed, {} failed, {} rows written",
            self.elapsed.as_secs_f64(),
            self.completed(),
            self.failed_count(),
            self.rows_written
        );
        for bucket in OutputBucket::ALL {
            let users = self.users(bucket);
            info!("  {}: {} users", bucket, users.len());
            if !users.is_empty() {
                debug!("  {} users: {}", bucket, users.join(", "));
            }
        }
        for (user_id, reason) in &self.failed {
            info!("  failed {}: {}", user_id, reason);
        }
    }
}

// ── BatchOrchestrator ─────────────────────────────────────────────────────────

/// Runs a [`UserProcessor`] over many users with bounded parallelism.
pub struct BatchOrchestrator {
    processor: Arc<dyn UserProcessor>,
    writer: OutputWriter,
    workers: usize,
    user_timeout: Duration,
}

impl BatchOrchestrator {
    /// Sequential orchestrator with the default time budget.
    pub fn new(processor: Arc<dyn UserProcessor>, writer: OutputWriter) -> Self {
        Self {
            processor,
            writer,
            workers: 1,
            user_timeout: DEFAULT_USER_TIMEOUT,
        }
    }

    /// Number of users processed concurrently (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_user_timeout(mut self, user_timeout: Duration) -> Self {
        self.user_timeout = user_timeout;
        self
    }

    /// Process every user in `user_ids` and write their output.
    pub async fn run(&self, user_ids: Vec<String>) -> RunSummary {
        let started = Instant::now();
        let total = user_ids.len();
        info!(
            "Processing {} users with {} workers ({}s budget per user)",
            total,
            self.workers,
            self.user_timeout.as_secs()
        );

        let mut summary = RunSummary::default();
        let mut pending = user_ids.into_iter().peekable();
        let mut join_set: JoinSet<(String, Result<UserOutput>)> = JoinSet::new();
        let slots = Arc::new(Semaphore::new(self.workers));
        let mut finished = 0usize;

        loop {
            while pending.peek().is_some() {
                let Ok(permit) = Arc::clone(&slots).try_acquire_owned() else {
                    break;
                };
                if let Some(user_id) = pending.next() {
                    self.spawn_user(&mut join_set, user_id, permit);
                }
            }

            if join_set.is_empty() {
                let Some(user_id) = pending.next() else {
                    break;
                };
                // Every slot is held by a pipeline that outlived its budget.
                debug!("Waiting for a worker slot before starting user {}", user_id);
                match Arc::clone(&slots).acquire_owned().await {
                    Ok(permit) => self.spawn_user(&mut join_set, user_id, permit),
                    Err(e) => {
                        error!("Worker pool closed: {}", e);
                        summary.failed.push((user_id, e.to_string()));
                        break;
                    }
                }
                continue;
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            finished += 1;

            match joined {
                Ok((user_id, Ok(output))) => match self.writer.write(&output) {
                    Ok(_) => summary.record_success(&output),
                    Err(e) => summary.record_failure(user_id, &e),
                },
                Ok((user_id, Err(e))) => summary.record_failure(user_id, &e),
                Err(e) => {
                    error!("Worker task lost: {}", e);
                    summary.failed.push(("<unknown>".to_string(), e.to_string()));
                }
            }
            debug!("Progress: {}/{} users", finished, total);
        }

        summary.elapsed = started.elapsed();
        summary
    }

    fn spawn_user(
        &self,
        join_set: &mut JoinSet<(String, Result<UserOutput>)>,
        user_id: String,
        slot: OwnedSemaphorePermit,
    ) {
        let processor = Arc::clone(&self.processor);
        let budget = self.user_timeout;

        join_set.spawn(async move {
            let id = user_id.clone();
            let task = tokio::task::spawn_blocking(move || {
                let _slot = slot;
                processor.process(&id)
            });

            let result = match tokio::time::timeout(budget, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(PrepError::Worker(format!(
                    "pipeline for user {} aborted: {}",
                    user_id, join_err
                ))),
                Err(_) => Err(PrepError::UserTimeout {
                    user_id: user_id.clone(),
                    seconds: budget.as_secs(),
                }),
            };
            (user_id, result)
        });
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// The users to process: from the list file when given, else every event
/// file found under `input_dir`.
pub fn select_user_ids(users_file: Option<&Path>, input_dir: &Path) -> Result<Vec<String>> {
    let ids = match users_file {
        Some(path) => load_user_ids(path)?,
        None => discover_user_ids(input_dir),
    };
    if ids.is_empty() {
        warn!("No users to process");
    }
    Ok(ids)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
