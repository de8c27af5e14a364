//! Category-based keep/drop rules.
//!
//! Rules only ever clear the `keep` flag, so turning a switch off can never
//! increase the number of kept events.

use clickstream_core::config::ClassifierSwitches;
use clickstream_core::models::NormalizedEvent;
use clickstream_core::module_key::NonContentPage;
use tracing::debug;

use crate::event_types;

/// Why an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NonContent,
    EmptyPayload,
    Enrollment,
    PageClose,
    FileUpload,
    ProblemServer,
    AncillaryVideo,
}

pub struct EventClassifier {
    switches: ClassifierSwitches,
}

impl EventClassifier {
    pub fn new(switches: ClassifierSwitches) -> Self {
        Self { switches }
    }

    /// Apply the rules to every event. Returns the number of kept events.
    pub fn classify(&self, events: &mut [NormalizedEvent]) -> usize {
        let mut kept = 0usize;
        for event in events.iter_mut() {
            if let Some(reason) = self.apply(event) {
                debug!(
                    "drop {:?}: user {} event {}",
                    reason, event.raw.user_id, event.raw.event_type
                );
                event.keep = false;
            }
            if event.keep {
                kept += 1;
            }
        }
        kept
    }

    /// Evaluate one event. Relabels kept non-content pages; returns the drop
    /// reason for anything that must go.
    fn apply(&self, event: &mut NormalizedEvent) -> Option<DropReason> {
        let event_type = event.raw.event_type.as_str();

        if let Some(page) = NonContentPage::from_event_type(event_type) {
            if !self.switches.keep_non_content {
                return Some(DropReason::NonContent);
            }
            event.module_key = page.module_key();
            return None;
        }

        if event_types::has_empty_payload(&event.raw.event)
            && !event_types::is_courseware_visit(event_type)
        {
            return Some(DropReason::EmptyPayload);
        }
        if event_types::is_enrollment(event_type) {
            return Some(DropReason::Enrollment);
        }
        if event_types::is_page_close(event_type) {
            return Some(DropReason::PageClose);
        }
        if event_types::is_file_upload(event_type) {
            return Some(DropReason::FileUpload);
        }
        if !self.switches.keep_problem_server_events
            && event_types::is_problem_server_event(event_type)
        {
            return Some(DropReason::ProblemServer);
        }
        if !self.switches.keep_ancillary_video_events && event_types::is_ancillary_video(event_type)
        {
            return Some(DropReason::AncillaryVideo);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clickstream_core::models::RawEvent;

    fn event(event_type: &str, payload: &str) -> NormalizedEvent {
        NormalizedEvent::new(
            RawEvent {
                user_id: "42".to_string(),
                course_id: "course-v1:MITx+6.00x+2T2017".to_string(),
                event_type: event_type.to_string(),
                event: payload.to_string(),
                ..Default::default()
            },
            Utc.with_ymd_and_hms(2017, 6, 1, 12, 0, 0).unwrap(),
        )
    }

    fn sample() -> Vec<NormalizedEvent> {
        vec![
            event("play_video", r#"{"id": "abc"}"#),
            event("problem_check", "input_x=1"),
            event("showanswer", r#"{"problem_id": "p"}"#),
            event("save_problem_success", r#"{"state": 1}"#),
            event("load_video", r#"{"id": "abc"}"#),
            event("speed_change_video", r#"{"new_speed": 2}"#),
            event("edx.video.transcript.shown", r#"{"id": "abc"}"#),
            event("/courses/course-v1:MITx+6.00x+2T2017/info", "{}"),
            event("/courses/course-v1:MITx+6.00x+2T2017/progress", "{}"),
            event("/courses/course-v1:MITx+6.00x+2T2017/courseware/ch/seq/", "{}"),
            event("edx.course.enrollment.activated", r#"{"mode": "audit"}"#),
            event("page_close", r#"{"x": 1}"#),
            event("openassessment.upload_file", r#"{"f": 1}"#),
            event("seq_next", "{}"),
        ]
    }

    fn kept_types(events: &[NormalizedEvent]) -> Vec<String> {
        events
            .iter()
            .filter(|e| e.keep)
            .map(|e| e.raw.event_type.clone())
            .collect()
    }

    #[test]
    fn test_default_switches_drop_optional_categories() {
        let mut events = sample();
        let kept = EventClassifier::new(ClassifierSwitches::default()).classify(&mut events);
        assert_eq!(
            kept_types(&events),
            vec![
                "play_video",
                "problem_check",
                "/courses/course-v1:MITx+6.00x+2T2017/courseware/ch/seq/",
            ]
        );
        assert_eq!(kept, 3);
    }

    #[test]
    fn test_non_content_relabelled_when_kept() {
        let mut events = vec![event("/courses/course-v1:MITx+6.00x+2T2017/info", "{}")];
        let switches = ClassifierSwitches {
            keep_non_content: true,
            ..Default::default()
        };
        assert_eq!(EventClassifier::new(switches).classify(&mut events), 1);
        assert_eq!(events[0].module_key, "noncontent+type@info");
    }

    #[test]
    fn test_always_dropped_regardless_of_switches() {
        let all_on = ClassifierSwitches {
            keep_non_content: true,
            keep_problem_server_events: true,
            keep_ancillary_video_events: true,
        };
        let mut events = vec![
            event("edx.course.enrollment.deactivated", r#"{"a": 1}"#),
            event("page_close", r#"{"a": 1}"#),
            event("openassessment.get_upload_url", r#"{"a": 1}"#),
            event("seq_goto", ""),
        ];
        assert_eq!(EventClassifier::new(all_on).classify(&mut events), 0);
    }

    #[test]
    fn test_filtering_is_monotonic_over_all_switches() {
        let combos = ClassifierSwitches::all_combinations();
        let results: Vec<(ClassifierSwitches, Vec<bool>)> = combos
            .iter()
            .map(|s| {
                let mut events = sample();
                EventClassifier::new(*s).classify(&mut events);
                (*s, events.iter().map(|e| e.keep).collect())
            })
            .collect();

        for (wide, wide_keep) in &results {
            for (narrow, narrow_keep) in &results {
                if !wide.keeps_at_least(narrow) {
                    continue;
                }
                for (w, n) in wide_keep.iter().zip(narrow_keep) {
                    assert!(*w || !*n, "{:?} dropped an event {:?} kept", wide, narrow);
                }
            }
        }
    }

    #[test]
    fn test_already_dropped_stays_dropped() {
        let mut events = vec![event("play_video", r#"{"id": "abc"}"#)];
        events[0].keep = false;
        assert_eq!(
            EventClassifier::new(ClassifierSwitches::default()).classify(&mut events),
            0
        );
    }
}
