//! Temporal normalisation: parse, order, and measure the gaps between events.

use chrono::{DateTime, Utc};
use clickstream_core::config::FinalPeriodPolicy;
use clickstream_core::data_processors::TimestampProcessor;
use clickstream_core::models::{NormalizedEvent, RawEvent};
use tracing::{debug, warn};

/// Minutes between two instants, with sub-second precision.
pub fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

/// Turns one user's raw rows into a chronologically ordered event list with
/// `period` filled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalNormalizer {
    final_period: FinalPeriodPolicy,
}

impl TemporalNormalizer {
    pub fn new(final_period: FinalPeriodPolicy) -> Self {
        Self { final_period }
    }

    /// Parse timestamps, sort ascending and compute periods.
    ///
    /// Rows whose timestamp cannot be parsed are dropped. The sort is stable,
    /// so rows sharing a timestamp keep their input order and get a period
    /// of zero between them.
    pub fn normalize(&self, raw: Vec<RawEvent>) -> Vec<NormalizedEvent> {
        let total = raw.len();
        let mut events: Vec<NormalizedEvent> = raw
            .into_iter()
            .filter_map(|row| match TimestampProcessor::parse_str(&row.time) {
                Some(ts) => Some(NormalizedEvent::new(row, ts)),
                None => {
                    warn!(
                        "Dropping event of user {} with unusable time \"{}\"",
                        row.user_id, row.time
                    );
                    None
                }
            })
            .collect();

        events.sort_by_key(|e| e.timestamp);
        self.fill_periods(&mut events);

        debug!(
            "TemporalNormalizer: {} of {} rows kept",
            events.len(),
            total
        );
        events
    }

    /// Fill `period` for ordered events. The last event gets the value of the
    /// final-period policy.
    pub fn fill_periods(&self, events: &mut [NormalizedEvent]) {
        let Some(last) = events.len().checked_sub(1) else {
            return;
        };

        let measured: Vec<f64> = events
            .windows(2)
            .map(|pair| minutes_between(pair[0].timestamp, pair[1].timestamp))
            .collect();

        for (event, period) in events.iter_mut().zip(measured.iter()) {
            event.period = *period;
        }
        events[last].period = self.final_period.final_period(&measured);
    }
}
