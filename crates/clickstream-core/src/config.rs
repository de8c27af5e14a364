//! Validated, immutable pipeline configuration.
//!
//! Built once per run from [`crate::settings::Settings`] and passed by
//! reference into every per-user pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PrepError, Result};

/// Default session-break threshold in minutes.
pub const DEFAULT_SESSION_THRESHOLD_MINUTES: f64 = 60.0;

/// How the final event's period is filled in. There is no following event
/// to measure a gap against, so the value is always synthetic.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalPeriodPolicy {
    /// Mean of the user's measured periods (0 for a single-event log).
    #[default]
    MeanOfMeasured,
    /// A fixed number of minutes.
    Fixed(f64),
}

impl FinalPeriodPolicy {
    /// Parse `"mean"` or a non-negative number of minutes.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("mean") {
            return Ok(FinalPeriodPolicy::MeanOfMeasured);
        }
        match trimmed.parse::<f64>() {
            Ok(minutes) if minutes.is_finite() && minutes >= 0.0 => {
                Ok(FinalPeriodPolicy::Fixed(minutes))
            }
            _ => Err(PrepError::Config(format!(
                "final_period must be \"mean\" or a non-negative number of minutes, got \"{}\"",
                raw
            ))),
        }
    }

    /// Apply the policy to the measured periods of one user.
    pub fn final_period(&self, measured: &[f64]) -> f64 {
        match self {
            FinalPeriodPolicy::Fixed(minutes) => *minutes,
            FinalPeriodPolicy::MeanOfMeasured => {
                if measured.is_empty() {
                    0.0
                } else {
                    measured.iter().sum::<f64>() / measured.len() as f64
                }
            }
        }
    }
}

/// The three category switches of the event classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassifierSwitches {
    /// Keep course info / progress / wiki page visits.
    pub keep_non_content: bool,
    /// Keep answer-reveal and save-success confirmations.
    pub keep_problem_server_events: bool,
    /// Keep transcript, load, speed and caption-menu video events.
    pub keep_ancillary_video_events: bool,
}

impl ClassifierSwitches {
    /// All eight switch combinations.
    pub fn all_combinations() -> Vec<ClassifierSwitches> {
        (0u8..8)
            .map(|bits| ClassifierSwitches {
                keep_non_content: bits & 1 != 0,
                keep_problem_server_events: bits & 2 != 0,
                keep_ancillary_video_events: bits & 4 != 0,
            })
            .collect()
    }

    /// `true` when every category `other` keeps is also kept by `self`.
    pub fn keeps_at_least(&self, other: &ClassifierSwitches) -> bool {
        (self.keep_non_content || !other.keep_non_content)
            && (self.keep_problem_server_events || !other.keep_problem_server_events)
            && (self.keep_ancillary_video_events || !other.keep_ancillary_video_events)
    }
}

/// Everything a single user's pipeline needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Gap in minutes at or above which an event closes a temporal session.
    pub session_threshold_minutes: f64,
    pub switches: ClassifierSwitches,
    pub final_period: FinalPeriodPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_threshold_minutes: DEFAULT_SESSION_THRESHOLD_MINUTES,
            switches: ClassifierSwitches::default(),
            final_period: FinalPeriodPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.session_threshold_minutes.is_finite() || self.session_threshold_minutes <= 0.0 {
            return Err(PrepError::Config(format!(
                "session threshold must be a positive number of minutes, got {}",
                self.session_threshold_minutes
            )));
        }
        Ok(())
    }
}

/// Interpret a switch value from the CLI or a config file.
///
/// Accepts JSON booleans, `0`/`1`, and the strings `true/false`, `t/f`,
/// `yes/no`, `y/n`, `1/0` in any case. Anything else is a fatal
/// configuration error.
pub fn parse_switch(name: &str, value: &Value) -> Result<bool> {
    let invalid = || {
        PrepError::Config(format!(
            "{} must be a boolean (true/false), got {}",
            name, value
        ))
    };
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(invalid()),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(true),
            "false" | "f" | "no" | "n" | "0" => Ok(false),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_switch_accepted_spellings() {
        for v in [json!(true), json!("TRUE"), json!("t"), json!("Yes"), json!(1), json!("1")] {
            assert!(parse_switch("nc", &v).unwrap(), "{} should be true", v);
        }
        for v in [json!(false), json!("False"), json!("F"), json!("no"), json!(0), json!("0")] {
            assert!(!parse_switch("nc", &v).unwrap(), "{} should be false", v);
        }
    }

    #[test]
    fn test_parse_switch_invalid_is_config_error() {
        for v in [json!("maybe"), json!(2), json!(null), json!([true])] {
            let err = parse_switch("keep_non_content", &v).unwrap_err();
            assert!(matches!(err, PrepError::Config(_)));
            assert!(err.to_string().contains("keep_non_content"));
        }
    }

    #[test]
    fn test_final_period_mean() {
        let policy = FinalPeriodPolicy::MeanOfMeasured;
        assert!((policy.final_period(&[5.0, 70.0, 10.0, 90.0]) - 43.75).abs() < 1e-9);
        assert_eq!(policy.final_period(&[]), 0.0);
    }

    #[test]
    fn test_final_period_fixed() {
        assert_eq!(FinalPeriodPolicy::Fixed(15.0).final_period(&[1.0, 2.0]), 15.0);
    }

    #[test]
    fn test_final_period_parse() {
        assert_eq!(
            FinalPeriodPolicy::parse("Mean").unwrap(),
            FinalPeriodPolicy::MeanOfMeasured
        );
        assert_eq!(
            FinalPeriodPolicy::parse("30").unwrap(),
            FinalPeriodPolicy::Fixed(30.0)
        );
        assert!(FinalPeriodPolicy::parse("-1").is_err());
        assert!(FinalPeriodPolicy::parse("median").is_err());
    }

    #[test]
    fn test_switch_combinations_and_ordering() {
        let all = ClassifierSwitches::all_combinations();
        assert_eq!(all.len(), 8);
        let everything = ClassifierSwitches {
            keep_non_content: true,
            keep_problem_server_events: true,
            keep_ancillary_video_events: true,
        };
        for s in &all {
            assert!(everything.keeps_at_least(s));
            assert!(s.keeps_at_least(&ClassifierSwitches::default()));
        }
    }

    #[test]
    fn test_validate_threshold() {
        assert!(PipelineConfig::default().validate().is_ok());
        let bad = PipelineConfig {
            session_threshold_minutes: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(PrepError::Config(_))));
    }
}
