//! Event scheduling: absolute start times for notes and chords
//!
//! Pure arithmetic over a playback speed. Durations and gaps are divided by
//! the speed here and nowhere else, so a speed of 2.0 halves every duration,
//! every gap and the total span. No clock is read; callers supply the start.

use serde::Serialize;

use crate::error::{DictationError, Result};
use crate::key::ScaleDegree;

/// Pause appended after the last event before a playback counts as finished
pub const SAFETY_MARGIN_SECS: f64 = 0.05;

/// Degrees sounded together
pub type Chord = Vec<ScaleDegree>;

/// One planned event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent<P> {
    pub payload: P,
    pub start_time: f64,
    pub duration: f64,
}

/// Ordered plan of events plus its timing envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule<P> {
    pub events: Vec<ScheduledEvent<P>>,
    pub start_time: f64,
    /// First onset to last release
    pub span: f64,
}

impl<P> Schedule<P> {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.span
    }

    /// When the plan is safe to treat as finished
    pub fn completion_time(&self) -> f64 {
        if self.events.is_empty() {
            return self.start_time;
        }
        self.end_time() + SAFETY_MARGIN_SECS
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduler {
    speed: f64,
}

impl Scheduler {
    pub fn new(speed: f64) -> Result<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(DictationError::invalid(
                "playbackSpeed",
                format!("must be a positive number, got {speed}"),
            ));
        }
        Ok(Self { speed })
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Nominal seconds converted to seconds at this speed
    pub fn scaled(&self, secs: f64) -> f64 {
        secs / self.speed
    }

    /// Lay events end to end: event i starts at `start + i * (duration + gap)`
    pub fn schedule_sequence<P>(
        &self,
        events: impl IntoIterator<Item = P>,
        start_time: f64,
        duration: f64,
        gap: f64,
    ) -> Schedule<P> {
        let duration = self.scaled(duration);
        let step = duration + self.scaled(gap);

        let events: Vec<ScheduledEvent<P>> = events
            .into_iter()
            .enumerate()
            .map(|(i, payload)| ScheduledEvent {
                payload,
                start_time: start_time + i as f64 * step,
                duration,
            })
            .collect();

        let span = match events.len() {
            0 => 0.0,
            n => (n - 1) as f64 * step + duration,
        };

        Schedule { events, start_time, span }
    }

    /// Same layout for chords; each chord's notes share its start time
    pub fn schedule_cadence(
        &self,
        chords: &[Chord],
        start_time: f64,
        chord_duration: f64,
        gap: f64,
    ) -> Schedule<Chord> {
        self.schedule_sequence(chords.iter().cloned(), start_time, chord_duration, gap)
    }
}
