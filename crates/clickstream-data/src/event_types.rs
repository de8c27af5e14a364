//! Event-type vocabulary of the tracking logs.
//!
//! Both the classifier and the resolver key their rules on these predicates.
//! A type may belong to several groups: `speed_change_video` is a video
//! interaction for module extraction and an ancillary event for filtering.

use clickstream_core::data_processors::PayloadExtractor;

const ANSWER_REVEAL: &[&str] = &["showanswer", "show_answer"];

const SAVE_SUCCESS: &[&str] = &["save_problem_success"];

const VIDEO_INTERACTION: &[&str] = &[
    "play_video",
    "pause_video",
    "seek_video",
    "stop_video",
    "speed_change_video",
    "edx.video.played",
    "edx.video.paused",
    "edx.video.position.changed",
    "edx.video.stopped",
];

const VIDEO_TRANSCRIPT: &[&str] = &[
    "show_transcript",
    "hide_transcript",
    "edx.video.transcript.shown",
    "edx.video.transcript.hidden",
];

const ANCILLARY_VIDEO: &[&str] = &[
    "show_transcript",
    "hide_transcript",
    "edx.video.transcript.shown",
    "edx.video.transcript.hidden",
    "load_video",
    "edx.video.loaded",
    "speed_change_video",
    "video_show_cc_menu",
    "video_hide_cc_menu",
    "edx.video.language_menu.shown",
    "edx.video.language_menu.hidden",
];

const FILE_UPLOAD: &[&str] = &[
    "openassessment.upload_file",
    "openassessment.get_upload_url",
];

const ENROLLMENT_PREFIX: &str = "edx.course.enrollment";
const PAGE_CLOSE: &str = "page_close";
const SEQ_GOTO: &str = "seq_goto";
const SEQ_STEP: &[&str] = &["seq_next", "seq_prev"];
const WIDGET_MARKER: &str = "widget_placement";

pub fn is_answer_reveal(event_type: &str) -> bool {
    ANSWER_REVEAL.contains(&event_type)
}

/// Server confirmations of problem actions (answer reveal, save success).
pub fn is_problem_server_event(event_type: &str) -> bool {
    is_answer_reveal(event_type) || SAVE_SUCCESS.contains(&event_type)
}

pub fn is_video_interaction(event_type: &str) -> bool {
    VIDEO_INTERACTION.contains(&event_type)
}

pub fn is_video_transcript(event_type: &str) -> bool {
    VIDEO_TRANSCRIPT.contains(&event_type)
}

pub fn is_ancillary_video(event_type: &str) -> bool {
    ANCILLARY_VIDEO.contains(&event_type)
}

pub fn is_enrollment(event_type: &str) -> bool {
    event_type.starts_with(ENROLLMENT_PREFIX)
}

pub fn is_page_close(event_type: &str) -> bool {
    event_type == PAGE_CLOSE
}

pub fn is_file_upload(event_type: &str) -> bool {
    FILE_UPLOAD.contains(&event_type)
}

/// URL-style event type for a courseware page visit.
pub fn is_courseware_visit(event_type: &str) -> bool {
    event_type.starts_with('/') && event_type.split('/').any(|s| s == "courseware")
}

/// Event types that are request paths rather than action names.
pub fn is_url(event_type: &str) -> bool {
    event_type.starts_with('/')
}

/// Sequence tab jump carrying a widget placement.
pub fn is_sequence_goto(event_type: &str, payload: &str) -> bool {
    event_type == SEQ_GOTO && payload.contains(WIDGET_MARKER)
}

/// Sequence previous/next step carrying a widget placement.
pub fn is_sequence_step(event_type: &str, payload: &str) -> bool {
    SEQ_STEP.contains(&event_type) && payload.contains(WIDGET_MARKER)
}

/// Split a courseware URL into `(course path, sequential id)`.
///
/// `/courses/course-v1:X+Y+Z/courseware/{chapter}/{sequential}/` yields
/// `("course-v1:X+Y+Z", sequential)`; the legacy
/// `/courses/X/Y/Z/courseware/...` layout yields `("X/Y/Z", sequential)`.
pub fn courseware_sequential(event_type: &str) -> Option<(String, &str)> {
    let segments: Vec<&str> = event_type.split('/').collect();
    let pos = segments.iter().position(|s| *s == "courseware")?;
    let sequential = segments.get(pos + 2).filter(|s| !s.is_empty())?;
    let course = segments
        .iter()
        .take(pos)
        .skip_while(|s| **s != "courses")
        .skip(1)
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    Some((course, *sequential))
}

/// `true` when the payload carries nothing.
pub fn has_empty_payload(payload: &str) -> bool {
    PayloadExtractor::is_empty(payload)
}
