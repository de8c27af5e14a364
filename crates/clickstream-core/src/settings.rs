use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{
    parse_switch, ClassifierSwitches, FinalPeriodPolicy, PipelineConfig,
    DEFAULT_SESSION_THRESHOLD_MINUTES,
};
use crate::error::{PrepError, Result};

const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Turn per-user clickstream exports into session-segmented, module-resolved records
#[derive(Parser, Debug, Clone)]
#[command(
    name = "clickstream-prep",
    about = "Turn per-user clickstream exports into session-segmented, module-resolved records",
    version
)]
pub struct Settings {
    /// Directory holding one `{user_id}.jsonl` raw event file per user
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Course-structure table (JSON lines)
    #[arg(long)]
    pub structure: Option<PathBuf>,

    /// Output root directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// File listing user ids, one per line (default: every file in the input dir)
    #[arg(long)]
    pub users: Option<PathBuf>,

    /// JSON configuration file supplying values for flags not given here
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the effective settings to the configuration file
    #[arg(long)]
    pub save_config: bool,

    /// Session-break threshold in minutes
    #[arg(long, default_value_t = DEFAULT_SESSION_THRESHOLD_MINUTES)]
    pub session_threshold: f64,

    /// Keep course info / progress / wiki page visits (true/false)
    #[arg(long, default_value = "false")]
    pub keep_non_content: String,

    /// Keep answer-reveal and save-success confirmations (true/false)
    #[arg(long, default_value = "false")]
    pub keep_problem_server_events: String,

    /// Keep transcript, load, speed and caption-menu video events (true/false)
    #[arg(long, default_value = "false")]
    pub keep_ancillary_video_events: String,

    /// Period assigned to each user's final event: "mean" or a number of minutes
    #[arg(long, default_value = "mean")]
    pub final_period: String,

    /// Number of users processed concurrently (1-256)
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=256))]
    pub workers: u32,

    /// Per-user processing timeout in seconds
    #[arg(long, default_value = "120", value_parser = clap::value_parser!(u64).range(1..))]
    pub user_timeout_secs: u64,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = LOG_LEVELS)]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

// ── ConfigFile ─────────────────────────────────────────────────────────────────

/// Settings persisted as JSON, by default at `~/.clickstream-prep/config.json`.
///
/// Switch values are kept as raw JSON so that a config file holding
/// `"keep_non_content": "sometimes"` fails validation instead of being
/// silently coerced.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_non_content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_problem_server_events: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_ancillary_video_events: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_period: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl ConfigFile {
    /// Return the default path to the config file.
    pub fn default_path() -> PathBuf {
        Self::default_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn default_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".clickstream-prep").join("config.json")
    }

    /// Load a config file. A missing file yields `None`; an unreadable or
    /// malformed one is a configuration error.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|source| PrepError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map(Some).map_err(|e| {
            PrepError::Config(format!("invalid config file {}: {}", path.display(), e))
        })
    }

    /// Atomically write the config to `path`, creating parent directories if
    /// needed.
    pub fn save_to(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }
}

// ── RunConfig ──────────────────────────────────────────────────────────────────

/// Fully validated settings for one batch run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pipeline: PipelineConfig,
    pub input_dir: PathBuf,
    pub structure_path: PathBuf,
    pub output_dir: PathBuf,
    pub users_file: Option<PathBuf>,
    pub workers: usize,
    pub user_timeout: Duration,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and merge the config file (explicit `--config` or
    /// the default path) for every flag not given on the command line.
    pub fn load() -> Result<Self> {
        Self::load_impl(std::env::args_os().collect(), &ConfigFile::default_path())
    }

    /// Full implementation: accepts args and the default config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_impl(args: Vec<std::ffi::OsString>, default_config: &Path) -> Result<Self> {
        // Build raw ArgMatches so we can query ValueSource.
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        let config_path = settings
            .config
            .clone()
            .unwrap_or_else(|| default_config.to_path_buf());
        if settings.config.is_some() && !config_path.exists() {
            return Err(PrepError::Config(format!(
                "config file {} does not exist",
                config_path.display()
            )));
        }

        if let Some(file) = ConfigFile::load_from(&config_path)? {
            settings.merge(file, &matches);
        }

        if settings.save_config {
            ConfigFile::from(&settings)
                .save_to(&config_path)
                .map_err(|source| PrepError::FileWrite {
                    path: config_path.clone(),
                    source,
                })?;
        }

        // --debug overrides log level.
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        Ok(settings)
    }

    /// Copy config-file values into fields the command line left at their
    /// defaults. CLI always wins.
    fn merge(&mut self, file: ConfigFile, matches: &clap::ArgMatches) {
        // NOTE: clap stores the arg id using the *field name* (underscores),
        // not the long-flag spelling (hyphens).
        let unset = |name: &str| !is_arg_explicitly_set(matches, name);

        if unset("input_dir") && file.input_dir.is_some() {
            self.input_dir = file.input_dir;
        }
        if unset("structure") && file.structure.is_some() {
            self.structure = file.structure;
        }
        if unset("output_dir") && file.output_dir.is_some() {
            self.output_dir = file.output_dir;
        }
        if unset("users") && file.users.is_some() {
            self.users = file.users;
        }
        if unset("session_threshold") {
            if let Some(v) = file.session_threshold {
                self.session_threshold = v;
            }
        }
        if unset("keep_non_content") {
            if let Some(v) = file.keep_non_content {
                self.keep_non_content = switch_text(&v);
            }
        }
        if unset("keep_problem_server_events") {
            if let Some(v) = file.keep_problem_server_events {
                self.keep_problem_server_events = switch_text(&v);
            }
        }
        if unset("keep_ancillary_video_events") {
            if let Some(v) = file.keep_ancillary_video_events {
                self.keep_ancillary_video_events = switch_text(&v);
            }
        }
        if unset("final_period") {
            if let Some(v) = file.final_period {
                self.final_period = switch_text(&v);
            }
        }
        if unset("workers") {
            if let Some(v) = file.workers {
                self.workers = v;
            }
        }
        if unset("user_timeout_secs") {
            if let Some(v) = file.user_timeout_secs {
                self.user_timeout_secs = v;
            }
        }
        if unset("log_level") {
            if let Some(v) = file.log_level {
                self.log_level = v.to_uppercase();
            }
        }
        if unset("log_file") && file.log_file.is_some() {
            self.log_file = file.log_file;
        }
    }

    /// Validate the pipeline-facing values. Any invalid value is fatal.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let switch = |name: &str, raw: &str| parse_switch(name, &Value::String(raw.to_string()));
        let config = PipelineConfig {
            session_threshold_minutes: self.session_threshold,
            switches: ClassifierSwitches {
                keep_non_content: switch("keep_non_content", &self.keep_non_content)?,
                keep_problem_server_events: switch(
                    "keep_problem_server_events",
                    &self.keep_problem_server_events,
                )?,
                keep_ancillary_video_events: switch(
                    "keep_ancillary_video_events",
                    &self.keep_ancillary_video_events,
                )?,
            },
            final_period: FinalPeriodPolicy::parse(&self.final_period)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate everything needed for a batch run.
    pub fn run_config(&self) -> Result<RunConfig> {
        let pipeline = self.pipeline_config()?;
        let required = |value: &Option<PathBuf>, flag: &str| {
            value
                .clone()
                .ok_or_else(|| PrepError::Config(format!("--{} is required", flag)))
        };

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(PrepError::Config(format!(
                "log level must be one of {:?}, got \"{}\"",
                LOG_LEVELS, self.log_level
            )));
        }
        if !(1..=256).contains(&self.workers) {
            return Err(PrepError::Config(format!(
                "workers must be between 1 and 256, got {}",
                self.workers
            )));
        }
        if self.user_timeout_secs == 0 {
            return Err(PrepError::Config(
                "user timeout must be at least one second".to_string(),
            ));
        }

        Ok(RunConfig {
            pipeline,
            input_dir: required(&self.input_dir, "input-dir")?,
            structure_path: required(&self.structure, "structure")?,
            output_dir: required(&self.output_dir, "output-dir")?,
            users_file: self.users.clone(),
            workers: self.workers as usize,
            user_timeout: Duration::from_secs(self.user_timeout_secs),
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
        })
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for ConfigFile {
    fn from(s: &Settings) -> Self {
        ConfigFile {
            input_dir: s.input_dir.clone(),
            structure: s.structure.clone(),
            output_dir: s.output_dir.clone(),
            users: s.users.clone(),
            session_threshold: Some(s.session_threshold),
            keep_non_content: Some(Value::String(s.keep_non_content.clone())),
            keep_problem_server_events: Some(Value::String(s.keep_problem_server_events.clone())),
            keep_ancillary_video_events: Some(Value::String(
                s.keep_ancillary_video_events.clone(),
            )),
            final_period: Some(Value::String(s.final_period.clone())),
            workers: Some(s.workers),
            user_timeout_secs: Some(s.user_timeout_secs),
            log_level: Some(s.log_level.clone()),
            log_file: s.log_file.clone(),
        }
    }
}

/// Render a config-file value the way it would have been typed on the CLI.
fn switch_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
