//! Temporal session segmentation.
//!
//! A long gap after an event closes a session. Every event belongs to the
//! session closed by the next boundary at or after it, so ids are assigned to
//! boundaries first and then propagated backward over the events in between.

use clickstream_core::models::NormalizedEvent;
use tracing::debug;

/// Anchor token for trailing events without a following platform session.
pub const SESSION_TOKEN_SENTINEL: &str = "session_end";

// ── BackfillColumn ────────────────────────────────────────────────────────────

/// A column of optional values filled backward from the next present value.
///
/// An anchor is appended past the end so that trailing gaps have something to
/// take, and is removed again once the fill is done.
#[derive(Debug, Clone)]
pub struct BackfillColumn<T> {
    slots: Vec<Option<T>>,
}

impl<T: Clone> BackfillColumn<T> {
    pub fn new(slots: Vec<Option<T>>) -> Self {
        Self { slots }
    }

    /// Fill every empty slot with the next present value, or `anchor` when
    /// none follows. The result has exactly as many values as there were
    /// slots.
    pub fn fill_backward(mut self, anchor: T) -> Vec<T> {
        self.slots.push(Some(anchor));

        let mut next: Option<T> = None;
        for slot in self.slots.iter_mut().rev() {
            match slot {
                Some(value) => next = Some(value.clone()),
                None => *slot = next.clone(),
            }
        }

        self.slots.pop();
        self.slots.into_iter().flatten().collect()
    }
}

impl<T> FromIterator<Option<T>> for BackfillColumn<T> {
    fn from_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

// ── SessionSegmenter ──────────────────────────────────────────────────────────

/// Assigns `tsess` ids from gap outliers and backfills platform session tokens.
pub struct SessionSegmenter {
    /// Gap, in minutes, at or above which an event closes its session.
    threshold_minutes: f64,
}

impl SessionSegmenter {
    pub fn new(threshold_minutes: f64) -> Self {
        Self { threshold_minutes }
    }

    pub fn is_boundary(&self, event: &NormalizedEvent) -> bool {
        event.period >= self.threshold_minutes
    }

    /// Segment time-ordered `events` in place. Returns the number of sessions.
    pub fn segment(&self, events: &mut [NormalizedEvent]) -> u32 {
        if events.is_empty() {
            return 0;
        }

        let mut boundary_id = 0u32;
        let column: BackfillColumn<u32> = events
            .iter()
            .map(|event| {
                if self.is_boundary(event) {
                    boundary_id += 1;
                    Some(boundary_id)
                } else {
                    None
                }
            })
            .collect();

        // Events after the last boundary form one more session.
        let ids = column.fill_backward(boundary_id + 1);
        for (event, id) in events.iter_mut().zip(ids) {
            event.tsess = id;
        }
        let sessions = events.last().map(|e| e.tsess).unwrap_or(0);

        backfill_session_tokens(events);

        debug!(
            "SessionSegmenter: {} events in {} sessions ({} boundaries)",
            events.len(),
            sessions,
            boundary_id
        );
        sessions
    }
}

/// Replace blank platform session tokens with the next non-blank token, or
/// [`SESSION_TOKEN_SENTINEL`] when no later token exists.
pub fn backfill_session_tokens(events: &mut [NormalizedEvent]) {
    let column: BackfillColumn<String> = events
        .iter()
        .map(|e| {
            let token = e.raw.session.trim();
            (!token.is_empty()).then(|| token.to_string())
        })
        .collect();

    let tokens = column.fill_backward(SESSION_TOKEN_SENTINEL.to_string());
    for (event, token) in events.iter_mut().zip(tokens) {
        event.raw.session = token;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
