//! Module-key extraction and resolution against the course structure.
//!
//! Most events reference content through their usage key, but navigation,
//! video and answer-reveal events carry the real reference in the payload or
//! the URL. Extraction rewrites `module_key` from those sources; resolution
//! then walks sequence references down to a leaf:
//!
//! 1. a `sequential` key plus a child index selects a vertical;
//! 2. the vertical's first child is the leaf.
//!
//! An event is emitted only if its final key is a node with an order.

use clickstream_core::data_processors::PayloadExtractor;
use clickstream_core::models::NormalizedEvent;
use clickstream_core::module_key::{ModuleKey, NonContentPage, SEQUENTIAL, VIDEO};
use clickstream_core::structure::CourseStructure;
use tracing::debug;

use crate::event_types;

/// Order given to non-content pages, which sit outside the hierarchy.
pub const NON_CONTENT_ORDER: u32 = 0;
/// Module type reported for non-content pages.
pub const NON_CONTENT_TYPE: &str = "noncontent";
/// Event type that replaces URL paths once they resolve to content.
pub const ACCESS_MODULE: &str = "access_module";

/// Child index entered by a courseware page visit.
const FIRST_CHILD: &str = "1";

// Quoted-token positions of the fields in non-JSON payloads.
const ANSWER_PROBLEM_POS: usize = 4;
const GOTO_ID_POS: usize = 18;
const GOTO_CHILD_POS: usize = 9;
const STEP_ID_POS: usize = 16;
const STEP_CHILD_POS: usize = 13;

// ── Public types ──────────────────────────────────────────────────────────────

/// An event attached to a content leaf (or a non-content page).
#[derive(Debug, Clone)]
pub struct ResolvedEvent {
    pub event: NormalizedEvent,
    pub hex_id: String,
    pub module_type: String,
    pub order: u32,
    pub parent_id: Option<String>,
}

/// Why an event could not be attached to a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    MissingKey,
    MissingChildIndex,
    NoChild { parent: String, child: String },
    NoLeaf { parent: String },
    NotInStructure,
    NoOrder,
}

/// Result of resolving one user's kept events.
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub resolved: Vec<ResolvedEvent>,
    pub unresolved: Vec<NormalizedEvent>,
}

// ── ModuleResolver ────────────────────────────────────────────────────────────

pub struct ModuleResolver<'a> {
    structure: &'a CourseStructure,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(structure: &'a CourseStructure) -> Self {
        Self { structure }
    }

    /// Extract and resolve every event, preserving order.
    pub fn resolve(&self, events: Vec<NormalizedEvent>) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        for mut event in events {
            extract_module_key(&mut event);
            match self.resolve_one(event) {
                Ok(resolved) => outcome.resolved.push(resolved),
                Err((event, reason)) => {
                    debug!(
                        "unresolved {:?}: user {} event {} key \"{}\"",
                        reason, event.raw.user_id, event.raw.event_type, event.module_key
                    );
                    outcome.unresolved.push(event);
                }
            }
        }
        outcome
    }

    /// Walk `event.module_key` to a leaf with an order.
    pub fn resolve_one(
        &self,
        mut event: NormalizedEvent,
    ) -> Result<ResolvedEvent, (NormalizedEvent, Unresolved)> {
        if let Some(page) = NonContentPage::from_module_key(&event.module_key) {
            return Ok(ResolvedEvent {
                event,
                hex_id: page.as_str().to_string(),
                module_type: NON_CONTENT_TYPE.to_string(),
                order: NON_CONTENT_ORDER,
                parent_id: None,
            });
        }
        if event.module_key.trim().is_empty() {
            return Err((event, Unresolved::MissingKey));
        }

        if let Some(sequence) = ModuleKey::parse(&event.module_key).filter(|k| k.is_sequential()) {
            let Some(child) = event.child_index.clone() else {
                return Err((event, Unresolved::MissingChildIndex));
            };
            let Some(vertical) = self.structure.child(&sequence.hex_id, &child) else {
                return Err((
                    event,
                    Unresolved::NoChild {
                        parent: sequence.hex_id,
                        child,
                    },
                ));
            };
            event.module_key = vertical.id.clone();
            event.depth = Some(vertical.depth);

            let Some(leaf) = self.structure.child(vertical.hex_id(), FIRST_CHILD) else {
                let parent = vertical.hex_id().to_string();
                return Err((event, Unresolved::NoLeaf { parent }));
            };
            event.module_key = leaf.id.clone();
            event.depth = Some(leaf.depth);
        }

        let Some(node) = self.structure.by_module_key(&event.module_key) else {
            return Err((event, Unresolved::NotInStructure));
        };
        let Some(order) = node.order else {
            return Err((event, Unresolved::NoOrder));
        };

        let (hex_id, module_type) = match ModuleKey::parse(&event.module_key) {
            Some(parsed) => (parsed.hex_id, parsed.module_type),
            None => (node.hex_id().to_string(), node.module_type.clone()),
        };
        let parent_id = node.parent_hex_id().map(str::to_string);
        if event.depth.is_none() {
            event.depth = Some(node.depth);
        }
        if event_types::is_url(&event.raw.event_type) {
            event.raw.event_type = ACCESS_MODULE.to_string();
        }

        Ok(ResolvedEvent {
            event,
            hex_id,
            module_type,
            order,
            parent_id,
        })
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Rewrite `module_key` (and `child_index`) from the payload or URL when the
/// event type carries its reference there. Events relabelled as non-content
/// pages are left alone.
pub fn extract_module_key(event: &mut NormalizedEvent) {
    if NonContentPage::from_module_key(&event.module_key).is_some() {
        return;
    }

    let raw = &event.raw;
    let event_type = raw.event_type.as_str();
    let payload = raw.event.as_str();

    let extracted: Option<(String, Option<String>)> = if event_types::is_answer_reveal(event_type)
    {
        payload_value(payload, &["problem_id"], ANSWER_PROBLEM_POS).map(|key| (key, None))
    } else if event_types::is_video_interaction(event_type)
        || event_types::is_video_transcript(event_type)
    {
        video_block_id(payload).map(|id| (ModuleKey::synthesize(&raw.course_id, VIDEO, &id), None))
    } else if event_types::is_courseware_visit(event_type) {
        event_types::courseware_sequential(event_type).map(|(url_course, sequential)| {
            let course = if raw.course_id.trim().is_empty() {
                url_course
            } else {
                raw.course_id.clone()
            };
            (
                ModuleKey::synthesize(&course, SEQUENTIAL, sequential),
                Some(FIRST_CHILD.to_string()),
            )
        })
    } else if event_types::is_sequence_goto(event_type, payload) {
        payload_value(payload, &["id"], GOTO_ID_POS).map(|key| {
            let child = payload_value(payload, &["target_tab", "new"], GOTO_CHILD_POS);
            (key, child)
        })
    } else if event_types::is_sequence_step(event_type, payload) {
        payload_value(payload, &["id"], STEP_ID_POS).map(|key| {
            let child = payload_value(payload, &["new"], STEP_CHILD_POS);
            (key, child)
        })
    } else {
        None
    };

    if let Some((key, child)) = extracted {
        event.module_key = key;
        event.child_index = child
            .as_deref()
            .and_then(PayloadExtractor::normalize_child_index);
    }
}

/// A named field for JSON payloads, or a positional quoted token otherwise.
fn payload_value(payload: &str, names: &[&str], position: usize) -> Option<String> {
    if PayloadExtractor::object(payload).is_some() {
        return PayloadExtractor::field(payload, names);
    }
    PayloadExtractor::quoted_token(payload, position)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// The video block id: from the `id` field when present, else anywhere in
/// the payload.
fn video_block_id(payload: &str) -> Option<String> {
    PayloadExtractor::field(payload, &["id"])
        .and_then(|id| PayloadExtractor::block_id(&id).map(str::to_string))
        .or_else(|| PayloadExtractor::block_id(payload).map(str::to_string))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
